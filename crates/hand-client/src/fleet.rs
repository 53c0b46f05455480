//! 舵机组控制器
//!
//! [`Fleet`] 独占总线与全部舵机记录（按 ID 升序的 arena），负责：
//! - 广播发现与同步读取轮询组的重建
//! - 批量操作：逐个 ID 执行，返回成功的子集，单个失败不会中断整批
//! - 批量读取：每个请求的 ID 对应一个结果（值或分类失败），顺序与请求一致
//! - 收尾：关闭扭矩、关闭总线，`shutdown()` 与 `Drop` 共用同一次收尾
//!
//! # 示例
//!
//! ```no_run
//! use hand_client::{FleetBuilder, types::Degrees};
//!
//! let mut fleet = FleetBuilder::new().motors(2).build().unwrap();
//! let done = fleet.set_torque(true, None);
//! println!("torque on: {:?}", done.succeeded);
//! fleet.set_position(Degrees(90.0), Some(&[1]));
//! let report = fleet.shutdown();
//! println!("{:?}", report);
//! ```

use crate::actuator::Actuator;
use crate::builder::FleetConfig;
use crate::types::{ActuatorRecord, ClientError, Degrees, LoadPercent, PwmPercent, Rpm, Volts};
use hand_bus::BusAdapter;
use hand_driver::{Bus, DriverError, Executor, PollGroup, discover};
use hand_protocol::{BaudRate, OperatingMode, map};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// 批量写操作结果
#[derive(Debug, Default)]
pub struct BatchResult {
    /// 成功的 ID（请求顺序）
    pub succeeded: Vec<u8>,
    /// 失败的 ID 及分类失败
    pub failed: Vec<(u8, ClientError)>,
}

impl BatchResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 批量读取结果：每个请求的 ID 一项
#[derive(Debug)]
pub struct Readings<T> {
    pub entries: Vec<(u8, Result<T, ClientError>)>,
}

impl<T: Copy> Readings<T> {
    pub fn ids(&self) -> Vec<u8> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    /// 每个 ID 的值，失败为 `None`
    pub fn values(&self) -> Vec<Option<T>> {
        self.entries
            .iter()
            .map(|(_, result)| result.as_ref().ok().copied())
            .collect()
    }

    pub fn get(&self, id: u8) -> Option<&Result<T, ClientError>> {
        self.entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, result)| result)
    }
}

/// 收尾报告
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    /// 扭矩原本开启、已关闭
    pub disabled: Vec<u8>,
    /// 扭矩原本已关闭
    pub already_off: Vec<u8>,
    /// 检查或关闭失败（尽力而为，不中断）
    pub failed: Vec<u8>,
    /// 总线已关闭，跳过扭矩检查
    pub skipped: bool,
}

/// 舵机组控制器
pub struct Fleet<A: BusAdapter> {
    bus: Bus<A>,
    executor: Executor,
    actuators: BTreeMap<u8, ActuatorRecord>,
    poll_group: PollGroup,
    config: FleetConfig,
    torn_down: bool,
}

impl<A: BusAdapter> Fleet<A> {
    /// 发现舵机并配置同步读取
    ///
    /// 发现失败（`DiscoveryFailed`）对会话是致命的。
    pub fn new(bus: Bus<A>, config: FleetConfig) -> Result<Self, ClientError> {
        let poll_group = PollGroup::new(&map::PRESENT_POSITION)?;
        let mut fleet = Self {
            bus,
            executor: Executor::new(),
            actuators: BTreeMap::new(),
            poll_group,
            config,
            torn_down: false,
        };
        fleet.discover(None)?;
        Ok(fleet)
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// 已发现的 ID（升序）
    pub fn ids(&self) -> Vec<u8> {
        self.actuators.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.actuators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actuators.is_empty()
    }

    pub fn record(&self, id: u8) -> Option<&ActuatorRecord> {
        self.actuators.get(&id)
    }

    pub fn bus(&self) -> &Bus<A> {
        &self.bus
    }

    /// 同步读取轮询组当前成员
    pub fn poll_ids(&self) -> &[u8] {
        self.poll_group.ids()
    }

    /// 借用单个舵机
    pub fn actuator(&mut self, id: u8) -> Result<Actuator<'_, A>, ClientError> {
        let record = self
            .actuators
            .get_mut(&id)
            .ok_or(ClientError::UnknownActuator(id))?;
        Ok(Actuator::new(
            &mut self.bus,
            &self.executor,
            record,
            self.config.mode_switch,
        ))
    }

    // ==================== 发现 / 轮询组 ====================

    /// 重新发现舵机
    ///
    /// 注册表按发现结果整体替换，同步读取轮询组随之重建。
    pub fn discover(&mut self, expected: Option<usize>) -> Result<Vec<u8>, ClientError> {
        // 发现成功后才记住新的期望数量
        let expected = expected.unwrap_or(self.config.expected);
        let devices = discover(&mut self.bus, expected, self.config.discovery_attempts)?;
        self.config.expected = expected;

        self.actuators = devices
            .iter()
            .map(|device| {
                let record = ActuatorRecord::new(device);
                let (_, known) = hand_protocol::Capabilities::for_model(device.model);
                if !known {
                    warn!(
                        "Actuator {} has unknown model {}, assuming full capabilities",
                        device.id, device.model
                    );
                }
                (device.id, record)
            })
            .collect();
        self.config_sync_read()?;
        Ok(self.ids())
    }

    /// 以当前注册表重建同步读取轮询组
    pub fn config_sync_read(&mut self) -> Result<Vec<u8>, ClientError> {
        let ids = self.ids();
        self.poll_group.rebuild(&ids)?;
        Ok(ids)
    }

    // ==================== 批量执行 ====================

    fn targets(&self, ids: Option<&[u8]>) -> Vec<u8> {
        match ids {
            Some(ids) => ids.to_vec(),
            None => self.ids(),
        }
    }

    fn for_each<T, F>(&mut self, ids: Option<&[u8]>, mut op: F) -> Vec<(u8, Result<T, ClientError>)>
    where
        F: FnMut(&mut Actuator<'_, A>) -> Result<T, ClientError>,
    {
        self.targets(ids)
            .into_iter()
            .map(|id| {
                let result = self.actuator(id).and_then(|mut actuator| op(&mut actuator));
                (id, result)
            })
            .collect()
    }

    fn batch<F>(&mut self, what: &str, ids: Option<&[u8]>, op: F) -> BatchResult
    where
        F: FnMut(&mut Actuator<'_, A>) -> Result<(), ClientError>,
    {
        let mut result = BatchResult::default();
        for (id, outcome) in self.for_each(ids, op) {
            match outcome {
                Ok(()) => result.succeeded.push(id),
                Err(e) => {
                    warn!("Motor_{}: {} failed: {}", id, what, e);
                    result.failed.push((id, e));
                },
            }
        }
        if !result.succeeded.is_empty() {
            info!("Motor_{:?}: {}", result.succeeded, what);
        }
        result
    }

    fn readings<T, F>(&mut self, what: &str, ids: Option<&[u8]>, op: F) -> Readings<T>
    where
        F: FnMut(&mut Actuator<'_, A>) -> Result<T, ClientError>,
    {
        let entries = self.for_each(ids, op);
        for (id, result) in &entries {
            if let Err(e) = result {
                warn!("Motor_{}: reading {} failed: {}", id, what, e);
            }
        }
        Readings { entries }
    }

    // ==================== 批量写 ====================

    pub fn set_led(&mut self, on: bool, ids: Option<&[u8]>) -> BatchResult {
        let what = if on { "LED has been ENABLED" } else { "LED has been DISABLED" };
        self.batch(what, ids, |a| a.set_led(on))
    }

    pub fn set_torque(&mut self, enable: bool, ids: Option<&[u8]>) -> BatchResult {
        let what = if enable {
            "Torque has been ENABLED"
        } else {
            "Torque has been DISABLED"
        };
        self.batch(what, ids, |a| a.set_torque(enable))
    }

    pub fn set_mode(&mut self, mode: OperatingMode, ids: Option<&[u8]>) -> BatchResult {
        let what = format!("{} mode has been set", mode.name());
        self.batch(&what, ids, |a| a.set_mode(mode))
    }

    pub fn set_position(&mut self, goal: Degrees, ids: Option<&[u8]>) -> BatchResult {
        let what = format!("Goal position has been set = [{}]", goal);
        self.batch(&what, ids, |a| a.set_position(goal))
    }

    pub fn set_velocity(&mut self, goal: Rpm, ids: Option<&[u8]>) -> BatchResult {
        let what = format!("Goal velocity has been set = [{}]", goal);
        self.batch(&what, ids, |a| a.set_velocity(goal))
    }

    pub fn set_pwm(&mut self, goal: PwmPercent, ids: Option<&[u8]>) -> BatchResult {
        let what = format!("Goal PWM has been set = [{}]", goal);
        self.batch(&what, ids, |a| a.set_pwm(goal))
    }

    /// 修改波特率
    ///
    /// 先向目标写入波特率码值，再以新波特率重新打开总线并重新发现。
    /// 重新打开或重新发现失败是致命错误。
    pub fn set_baud_rate(
        &mut self,
        baud: BaudRate,
        ids: Option<&[u8]>,
    ) -> Result<BatchResult, ClientError> {
        let what = format!("Baudrate has been set = [{}]", baud.bps());
        let result = self.batch(&what, ids, |a| a.set_baud_rate(baud));

        self.bus
            .reopen(baud.bps())
            .map_err(DriverError::Transport)?;
        self.discover(None)?;
        Ok(result)
    }

    // ==================== 批量读 ====================

    pub fn torque(&mut self, ids: Option<&[u8]>) -> Readings<bool> {
        self.readings("torque", ids, |a| a.torque())
    }

    pub fn led(&mut self, ids: Option<&[u8]>) -> Readings<bool> {
        self.readings("LED", ids, |a| a.led())
    }

    pub fn mode(&mut self, ids: Option<&[u8]>) -> Readings<OperatingMode> {
        self.readings("mode", ids, |a| a.mode())
    }

    pub fn voltage(&mut self, ids: Option<&[u8]>) -> Readings<Volts> {
        self.readings("voltage", ids, |a| a.voltage())
    }

    pub fn load(&mut self, ids: Option<&[u8]>) -> Readings<LoadPercent> {
        self.readings("load", ids, |a| a.load())
    }

    pub fn position(&mut self, ids: Option<&[u8]>) -> Readings<Degrees> {
        self.readings("position", ids, |a| a.position())
    }

    pub fn velocity_limit(&mut self, ids: Option<&[u8]>) -> Readings<u32> {
        self.readings("velocity limit", ids, |a| a.velocity_limit())
    }

    pub fn baud_rate(&mut self, ids: Option<&[u8]>) -> Readings<BaudRate> {
        self.readings("baud rate", ids, |a| a.baud_rate())
    }

    /// 同步读取全部舵机位置
    ///
    /// 一次总线交换；任一成员不可用则整轮重试，最多 5 轮。
    /// 全部原始值在同一轮内统一换算。
    pub fn sync_position(&mut self) -> Result<Vec<(u8, Degrees)>, ClientError> {
        let raw = self.poll_group.read(&mut self.bus)?;
        let positions: Vec<(u8, Degrees)> = raw
            .into_iter()
            .map(|(id, value)| (id, Degrees::from_raw(value as i32)))
            .collect();
        for (id, position) in &positions {
            if let Some(record) = self.actuators.get_mut(id) {
                record.telemetry.position = Some(*position);
            }
        }
        Ok(positions)
    }

    // ==================== 收尾 ====================

    /// 关闭扭矩并关闭总线
    pub fn shutdown(mut self) -> TeardownReport {
        self.teardown()
    }

    fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.torn_down {
            return report;
        }
        self.torn_down = true;

        if !self.bus.is_open() {
            warn!("Bus already closed, skipping torque teardown");
            report.skipped = true;
            return report;
        }

        for id in self.ids() {
            match self
                .actuator(id)
                .and_then(|mut a| a.disable_torque_if_enabled())
            {
                Ok(true) => report.disabled.push(id),
                Ok(false) => report.already_off.push(id),
                Err(e) => {
                    warn!("Motor_{}: failed to disable torque on teardown: {}", id, e);
                    report.failed.push(id);
                },
            }
        }
        self.bus.close();
        info!(
            "Teardown complete: disabled {:?}, already off {:?}, failed {:?}",
            report.disabled, report.already_off, report.failed
        );
        report
    }
}

impl<A: BusAdapter> Drop for Fleet<A> {
    fn drop(&mut self) {
        self.teardown();
    }
}
