//! 设备记录与遥测缓存

use super::units::{Degrees, LoadPercent, Volts};
use hand_driver::DiscoveredDevice;
use hand_protocol::{BaudRate, Capabilities, OperatingMode};

/// 最近一次成功读取/写入得到的状态
///
/// 只由成功的事务结果更新，失败不会清空旧值。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Telemetry {
    pub position: Option<Degrees>,
    pub load: Option<LoadPercent>,
    pub voltage: Option<Volts>,
    pub torque_enabled: Option<bool>,
    pub led: Option<bool>,
    pub mode: Option<OperatingMode>,
    pub baud: Option<BaudRate>,
    pub velocity_limit: Option<u32>,
}

/// 舵机记录（由 `Fleet` 独占）
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorRecord {
    pub id: u8,
    pub model: u16,
    pub firmware: u8,
    pub capabilities: Capabilities,
    pub telemetry: Telemetry,
}

impl ActuatorRecord {
    pub fn new(device: &DiscoveredDevice) -> Self {
        let (capabilities, _) = Capabilities::for_model(device.model);
        Self {
            id: device.id,
            model: device.model,
            firmware: device.firmware,
            capabilities,
            telemetry: Telemetry::default(),
        }
    }
}
