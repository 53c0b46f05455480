//! Fleet 集成测试（模拟总线）

use hand_bus::{VirtualBus, VirtualBusHandle, VirtualServo};
use hand_client::{
    BaudRate, ClientError, Degrees, FleetBuilder, ModeSwitchPolicy, OperatingMode, PwmPercent,
    Rpm,
};
use hand_driver::{DriverError, RETRY_BUDGET};
use hand_protocol::{DeviceErrorCode, Instruction, MODEL_XL_320, map};

fn fleet(ids: &[u8]) -> (hand_client::Fleet<VirtualBus>, VirtualBusHandle) {
    let (bus, handle) = VirtualBus::with_servos(1_000_000, ids);
    let fleet = FleetBuilder::new()
        .motors(ids.len())
        .build_with(bus)
        .unwrap();
    (fleet, handle)
}

#[test]
fn test_discovery_order_is_sorted() {
    let (bus, handle) = VirtualBus::with_servos(1_000_000, &[7, 3, 9]);
    handle.set_ping_order(&[9, 7, 3]);
    let fleet = FleetBuilder::new().motors(3).build_with(bus).unwrap();
    assert_eq!(fleet.ids(), vec![3, 7, 9]);
    assert_eq!(fleet.poll_ids(), &[3, 7, 9]);
}

#[test]
fn test_discovery_short_is_fatal() {
    let (bus, _handle) = VirtualBus::with_servos(1_000_000, &[1, 2]);
    let err = FleetBuilder::new()
        .motors(3)
        .discovery_attempts(2)
        .build_with(bus)
        .err()
        .unwrap();
    assert!(matches!(
        err,
        ClientError::Driver(DriverError::DiscoveryFailed { expected: 3, .. })
    ));
    assert!(err.is_fatal());
}

#[test]
fn test_batch_partial_failure() {
    let (mut fleet, handle) = fleet(&[1, 2, 3]);
    handle.set_register(1, &map::TORQUE_ENABLE, 1);
    handle.fail_comm_always(2);

    let result = fleet.set_led(true, Some(&[1, 2, 3]));
    assert_eq!(result.succeeded, vec![1, 3]);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].0, 2);

    // 其他状态不受影响
    assert_eq!(handle.register(1, &map::LED), Some(1));
    assert_eq!(handle.register(3, &map::LED), Some(1));
    assert!(handle.torque_enabled(1));
    assert!(!handle.torque_enabled(3));
}

#[test]
fn test_batch_failed_id_not_retried_beyond_budget() {
    let (mut fleet, handle) = fleet(&[1, 2]);
    handle.reset_sent();
    handle.fail_comm_always(2);
    let result = fleet.set_torque(true, None);
    assert_eq!(result.succeeded, vec![1]);
    assert_eq!(handle.write_count(2, &map::TORQUE_ENABLE), RETRY_BUDGET);
}

#[test]
fn test_unknown_id_in_batch() {
    let (mut fleet, _handle) = fleet(&[1]);
    let result = fleet.set_led(true, Some(&[1, 42]));
    assert_eq!(result.succeeded, vec![1]);
    assert!(matches!(
        result.failed[0],
        (42, ClientError::UnknownActuator(42))
    ));
}

#[test]
fn test_readings_in_request_order() {
    let (mut fleet, handle) = fleet(&[1, 2, 3]);
    handle.set_register(3, &map::PRESENT_VOLTAGE, 118);
    handle.device_error_always(2, DeviceErrorCode::ResultFail);

    let readings = fleet.voltage(Some(&[3, 2, 1]));
    assert_eq!(readings.ids(), vec![3, 2, 1]);
    let values: Vec<Option<f64>> = readings.values().iter().map(|v| v.map(|v| v.0)).collect();
    assert_eq!(values, vec![Some(11.8), None, Some(12.0)]);

    match readings.get(2) {
        Some(Err(ClientError::Transaction(failure))) => assert!(failure.is_device()),
        other => panic!("unexpected reading: {other:?}"),
    }
}

#[test]
fn test_torque_idempotent() {
    let (mut fleet, handle) = fleet(&[1]);
    assert_eq!(fleet.set_torque(true, None).succeeded, vec![1]);
    assert_eq!(fleet.set_torque(true, None).succeeded, vec![1]);
    assert!(handle.torque_enabled(1));
    let torque = fleet.torque(None);
    assert_eq!(torque.values(), vec![Some(true)]);
}

#[test]
fn test_position_roundtrip() {
    let (mut fleet, handle) = fleet(&[1]);
    fleet.set_torque(true, None);
    let result = fleet.set_position(Degrees(45.0), None);
    assert_eq!(result.succeeded, vec![1]);
    assert_eq!(handle.register(1, &map::PRESENT_POSITION), Some(512));

    let position = fleet.position(None).values()[0].unwrap();
    assert!((position.0 - 45.0).abs() <= Degrees::LSB);
    assert_eq!(
        fleet.record(1).unwrap().telemetry.position,
        Some(position)
    );
}

#[test]
fn test_negative_position() {
    let (mut fleet, handle) = fleet(&[1]);
    handle.set_present_position(1, -4095);
    assert_eq!(fleet.position(None).values(), vec![Some(Degrees(-360.0))]);
}

#[test]
fn test_sync_position() {
    let (mut fleet, handle) = fleet(&[1, 2]);
    handle.set_present_position(1, 4095);
    handle.set_present_position(2, -2048);
    handle.drop_sync_replies(1, 2);

    let positions = fleet.sync_position().unwrap();
    assert_eq!(positions[0], (1, Degrees(360.0)));
    assert_eq!(positions[1].0, 2);
    assert!((positions[1].1.0 + 180.04).abs() < 0.01);
    assert_eq!(handle.sent_count(Instruction::SyncRead), 3);
}

#[test]
fn test_sync_position_exhausted() {
    let (mut fleet, handle) = fleet(&[1, 2]);
    handle.drop_sync_replies(2, RETRY_BUDGET);
    assert!(matches!(
        fleet.sync_position(),
        Err(ClientError::SyncRead(_))
    ));
}

#[test]
fn test_mode_switch_caller_managed() {
    let (mut fleet, handle) = fleet(&[1]);
    fleet.set_torque(true, None);

    // 扭矩开启时设备拒绝写入运行模式
    let result = fleet.set_mode(OperatingMode::Velocity, None);
    assert!(result.succeeded.is_empty());
    assert_eq!(handle.register(1, &map::OPERATING_MODE), Some(4));

    fleet.set_torque(false, None);
    assert_eq!(
        fleet.set_mode(OperatingMode::Velocity, None).succeeded,
        vec![1]
    );
    assert_eq!(handle.register(1, &map::OPERATING_MODE), Some(1));
    assert_eq!(fleet.mode(None).values(), vec![Some(OperatingMode::Velocity)]);
}

#[test]
fn test_mode_switch_auto_disable_torque() {
    let (bus, handle) = VirtualBus::with_servos(1_000_000, &[1]);
    let mut fleet = FleetBuilder::new()
        .mode_switch_policy(ModeSwitchPolicy::AutoDisableTorque)
        .build_with(bus)
        .unwrap();
    fleet.set_torque(true, None);

    assert_eq!(fleet.set_mode(OperatingMode::Pwm, None).succeeded, vec![1]);
    assert_eq!(handle.register(1, &map::OPERATING_MODE), Some(16));
    assert!(handle.torque_enabled(1));
}

#[test]
fn test_mode_switch_torque_restore_failure() {
    let (bus, handle) = VirtualBus::with_servos(1_000_000, &[1]);
    let mut fleet = FleetBuilder::new()
        .mode_switch_policy(ModeSwitchPolicy::AutoDisableTorque)
        .build_with(bus)
        .unwrap();
    fleet.set_torque(true, None);
    handle.reject_write_value(1, &map::TORQUE_ENABLE, 1, DeviceErrorCode::ResultFail);

    let result = fleet.set_mode(OperatingMode::Velocity, None);
    assert!(result.succeeded.is_empty());
    assert!(matches!(result.failed[0].1, ClientError::Transaction(_)));

    // 模式已经写入，遥测随之更新；扭矩保持关闭
    assert_eq!(handle.register(1, &map::OPERATING_MODE), Some(1));
    assert!(!handle.torque_enabled(1));
    let telemetry = &fleet.record(1).unwrap().telemetry;
    assert_eq!(telemetry.mode, Some(OperatingMode::Velocity));
    assert_eq!(telemetry.torque_enabled, Some(false));
}

#[test]
fn test_unsupported_capability() {
    let (bus, handle) = VirtualBus::new(1_000_000);
    handle.insert_servo(VirtualServo::new(1, BaudRate::Baud1M).with_model(MODEL_XL_320));
    let mut fleet = FleetBuilder::new().build_with(bus).unwrap();
    handle.reset_sent();

    let result = fleet.set_pwm(PwmPercent(50.0), None);
    assert!(matches!(
        result.failed[0].1,
        ClientError::Unsupported { id: 1, .. }
    ));
    // 未触碰总线
    assert!(handle.sent().is_empty());
}

#[test]
fn test_velocity_and_pwm_registers() {
    let (mut fleet, handle) = fleet(&[1]);
    fleet.set_velocity(Rpm(-229.0), None);
    assert_eq!(
        handle.register(1, &map::GOAL_VELOCITY),
        Some((-1023i32) as u32)
    );

    fleet.set_pwm(PwmPercent(-100.0), None);
    assert_eq!(handle.register(1, &map::GOAL_PWM), Some(0xFC8B));
}

#[test]
fn test_velocity_limit_and_baud() {
    let (mut fleet, _handle) = fleet(&[1]);
    assert_eq!(fleet.velocity_limit(None).values(), vec![Some(265)]);
    assert_eq!(fleet.baud_rate(None).values(), vec![Some(BaudRate::Baud1M)]);
}

#[test]
fn test_set_baud_rate_reopens_and_rediscovers() {
    let (mut fleet, handle) = fleet(&[1, 2]);
    let result = fleet.set_baud_rate(BaudRate::Baud57600, None).unwrap();
    assert_eq!(result.succeeded, vec![1, 2]);
    assert_eq!(handle.baud_rate(), 57_600);
    assert_eq!(fleet.ids(), vec![1, 2]);
    assert_eq!(fleet.baud_rate(None).values(), vec![
        Some(BaudRate::Baud57600),
        Some(BaudRate::Baud57600)
    ]);
}

#[test]
fn test_rediscovery_rebuilds_poll_group() {
    let (mut fleet, handle) = fleet(&[1, 2, 3]);
    handle.remove_servo(2);
    assert_eq!(fleet.discover(Some(2)).unwrap(), vec![1, 3]);
    assert_eq!(fleet.poll_ids(), &[1, 3]);
    assert!(fleet.sync_position().is_ok());
}

#[test]
fn test_failed_rediscovery_keeps_expected_count() {
    let (mut fleet, _handle) = fleet(&[1, 2]);
    let err = fleet.discover(Some(5)).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(fleet.config().expected, 2);
    assert_eq!(fleet.ids(), vec![1, 2]);

    // 省略期望数量时沿用之前成功的值
    assert_eq!(fleet.discover(None).unwrap(), vec![1, 2]);
}

#[test]
fn test_shutdown_disables_torque_once() {
    let (mut fleet, handle) = fleet(&[1, 2]);
    fleet.set_torque(true, Some(&[2]));

    let report = fleet.shutdown();
    assert_eq!(report.disabled, vec![2]);
    assert_eq!(report.already_off, vec![1]);
    assert!(report.failed.is_empty());
    assert!(!handle.torque_enabled(2));
    assert!(!handle.is_open());
    // Drop 不会再次执行收尾
    assert_eq!(handle.write_count(2, &map::TORQUE_ENABLE), 2);
}

#[test]
fn test_drop_disables_torque() {
    let (mut fleet, handle) = fleet(&[1]);
    fleet.set_torque(true, None);
    drop(fleet);
    assert!(!handle.torque_enabled(1));
    assert!(!handle.is_open());
}

#[test]
fn test_teardown_tolerates_closed_bus() {
    let (mut fleet, handle) = fleet(&[1]);
    fleet.set_torque(true, None);
    handle.close();
    let report = fleet.shutdown();
    assert!(report.skipped);
    // 总线已关闭，扭矩状态无法改变
    assert!(handle.torque_enabled(1));
}

#[test]
fn test_teardown_failure_is_best_effort() {
    let (mut fleet, handle) = fleet(&[1, 2]);
    fleet.set_torque(true, None);
    handle.fail_comm_always(1);
    let report = fleet.shutdown();
    assert_eq!(report.failed, vec![1]);
    assert_eq!(report.disabled, vec![2]);
}
