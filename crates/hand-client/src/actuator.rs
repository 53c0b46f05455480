//! 单舵机接口
//!
//! [`Actuator`] 是对某个已发现舵机的短期借用视图：
//! 总线、执行器与设备记录都由 `Fleet` 拥有，这里只持有引用，
//! 因此不可能出现第二个总线所有者。
//!
//! 每个操作对应一个寄存器事务，成功后更新遥测缓存。

use crate::builder::ModeSwitchPolicy;
use crate::types::{ActuatorRecord, ClientError, Degrees, LoadPercent, PwmPercent, Rpm, Volts};
use hand_bus::BusAdapter;
use hand_driver::{Bus, Executor, Transaction};
use hand_protocol::{BaudRate, Capability, OperatingMode, Register, map};
use tracing::{debug, warn};

/// 单舵机视图
pub struct Actuator<'a, A: BusAdapter> {
    bus: &'a mut Bus<A>,
    executor: &'a Executor,
    record: &'a mut ActuatorRecord,
    policy: ModeSwitchPolicy,
}

impl<'a, A: BusAdapter> Actuator<'a, A> {
    pub(crate) fn new(
        bus: &'a mut Bus<A>,
        executor: &'a Executor,
        record: &'a mut ActuatorRecord,
        policy: ModeSwitchPolicy,
    ) -> Self {
        Self {
            bus,
            executor,
            record,
            policy,
        }
    }

    pub fn id(&self) -> u8 {
        self.record.id
    }

    pub fn record(&self) -> &ActuatorRecord {
        self.record
    }

    // ==================== 事务 ====================

    fn read(&mut self, register: &Register) -> Result<u32, ClientError> {
        let tx = Transaction::read(self.record.id, register)?;
        let value = self.executor.execute(self.bus, &tx)?;
        read_value(self.record.id, register, value)
    }

    fn write(&mut self, register: &Register, value: u32) -> Result<(), ClientError> {
        let tx = Transaction::write(self.record.id, register, value)?;
        self.executor.execute(self.bus, &tx)?;
        Ok(())
    }

    fn write_signed(&mut self, register: &Register, value: i32) -> Result<(), ClientError> {
        let tx = Transaction::write_signed(self.record.id, register, value)?;
        self.executor.execute(self.bus, &tx)?;
        Ok(())
    }

    fn require(&self, capability: Capability) -> Result<(), ClientError> {
        if self.record.capabilities.contains(capability) {
            Ok(())
        } else {
            Err(ClientError::Unsupported {
                id: self.record.id,
                capability,
            })
        }
    }

    // ==================== 扭矩 / LED ====================

    pub fn set_torque(&mut self, enable: bool) -> Result<(), ClientError> {
        self.write(&map::TORQUE_ENABLE, enable as u32)?;
        self.record.telemetry.torque_enabled = Some(enable);
        Ok(())
    }

    pub fn torque(&mut self) -> Result<bool, ClientError> {
        let enabled = self.read(&map::TORQUE_ENABLE)? != 0;
        self.record.telemetry.torque_enabled = Some(enabled);
        Ok(enabled)
    }

    pub fn set_led(&mut self, on: bool) -> Result<(), ClientError> {
        self.write(&map::LED, on as u32)?;
        self.record.telemetry.led = Some(on);
        Ok(())
    }

    pub fn led(&mut self) -> Result<bool, ClientError> {
        let on = self.read(&map::LED)? != 0;
        self.record.telemetry.led = Some(on);
        Ok(on)
    }

    // ==================== 运行模式 ====================

    /// 切换运行模式
    ///
    /// `ModeSwitchPolicy::CallerManaged` 下扭矩开启时设备会拒绝写入（Access Error）。
    pub fn set_mode(&mut self, mode: OperatingMode) -> Result<(), ClientError> {
        let capability = match mode {
            OperatingMode::Position => Capability::Position,
            OperatingMode::Velocity => Capability::Velocity,
            OperatingMode::Pwm => Capability::Pwm,
        };
        self.require(capability)?;

        let restore = match self.policy {
            ModeSwitchPolicy::CallerManaged => false,
            ModeSwitchPolicy::AutoDisableTorque => {
                let enabled = self.torque()?;
                if enabled {
                    debug!("Disabling torque on {} for mode switch", self.record.id);
                    self.set_torque(false)?;
                }
                enabled
            },
        };

        let result = self.write(&map::OPERATING_MODE, mode.code() as u32);
        if result.is_ok() {
            self.record.telemetry.mode = Some(mode);
        }
        // 恢复扭矩失败时，模式写入本身的错误优先上报
        if restore && let Err(e) = self.set_torque(true) {
            warn!("Failed to restore torque on {} after mode switch: {}", self.record.id, e);
            result?;
            return Err(e);
        }
        result
    }

    pub fn mode(&mut self) -> Result<OperatingMode, ClientError> {
        let code = self.read(&map::OPERATING_MODE)?;
        let mode = u8::try_from(code)
            .ok()
            .and_then(|c| OperatingMode::from_code(c).ok())
            .ok_or(ClientError::UnknownCode {
                id: self.record.id,
                field: "operating mode",
                value: code,
            })?;
        self.record.telemetry.mode = Some(mode);
        Ok(mode)
    }

    // ==================== 运动 ====================

    pub fn set_position(&mut self, goal: Degrees) -> Result<(), ClientError> {
        self.require(Capability::Position)?;
        self.write_signed(&map::GOAL_POSITION, goal.to_raw())
    }

    /// 当前位置（4 字节有符号）
    pub fn position(&mut self) -> Result<Degrees, ClientError> {
        let raw = self.read(&map::PRESENT_POSITION)? as i32;
        let position = Degrees::from_raw(raw);
        self.record.telemetry.position = Some(position);
        Ok(position)
    }

    pub fn set_velocity(&mut self, goal: Rpm) -> Result<(), ClientError> {
        self.require(Capability::Velocity)?;
        self.write_signed(&map::GOAL_VELOCITY, goal.to_raw())
    }

    /// 设置 PWM（负值为反向，16 位补码）
    pub fn set_pwm(&mut self, goal: PwmPercent) -> Result<(), ClientError> {
        self.require(Capability::Pwm)?;
        self.write_signed(&map::GOAL_PWM, goal.to_raw())
    }

    /// 速度上限（原始单位，0~1023）
    pub fn velocity_limit(&mut self) -> Result<u32, ClientError> {
        let limit = self.read(&map::VELOCITY_LIMIT)?;
        self.record.telemetry.velocity_limit = Some(limit);
        Ok(limit)
    }

    // ==================== 传感 ====================

    pub fn load(&mut self) -> Result<LoadPercent, ClientError> {
        let raw = self.read(&map::PRESENT_LOAD)?;
        let load = LoadPercent::from_raw(raw as u16);
        self.record.telemetry.load = Some(load);
        Ok(load)
    }

    pub fn voltage(&mut self) -> Result<Volts, ClientError> {
        let raw = self.read(&map::PRESENT_VOLTAGE)?;
        let voltage = Volts::from_raw(raw as u16);
        self.record.telemetry.voltage = Some(voltage);
        Ok(voltage)
    }

    // ==================== 波特率 ====================

    /// 写入波特率码值（写入后舵机立即以新波特率通信）
    pub fn set_baud_rate(&mut self, baud: BaudRate) -> Result<(), ClientError> {
        self.write(&map::BAUD_RATE, baud.code() as u32)?;
        self.record.telemetry.baud = Some(baud);
        Ok(())
    }

    pub fn baud_rate(&mut self) -> Result<BaudRate, ClientError> {
        let code = self.read(&map::BAUD_RATE)?;
        let baud = u8::try_from(code)
            .ok()
            .and_then(|c| BaudRate::from_code(c).ok())
            .ok_or(ClientError::UnknownCode {
                id: self.record.id,
                field: "baud rate",
                value: code,
            })?;
        self.record.telemetry.baud = Some(baud);
        Ok(baud)
    }

    // ==================== 收尾 ====================

    /// 检查扭矩，开启则关闭
    ///
    /// 返回是否执行了关闭。
    pub fn disable_torque_if_enabled(&mut self) -> Result<bool, ClientError> {
        if self.torque()? {
            self.set_torque(false)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// 读取事务的结果必须带值
fn read_value(id: u8, register: &Register, value: Option<u32>) -> Result<u32, ClientError> {
    value.ok_or(ClientError::MissingValue {
        id,
        field: register.name,
    })
}
