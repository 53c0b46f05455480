//! Client 层 Builder
//!
//! 链式配置串口与发现参数，构建已完成发现、已配置同步读取的 [`Fleet`]。

use crate::fleet::Fleet;
use crate::types::ClientError;
use hand_bus::BusAdapter;
use hand_driver::{BusBuilder, BusConfig};
use std::time::Duration;

/// 默认发现尝试次数
pub const DEFAULT_DISCOVERY_ATTEMPTS: usize = 10;

/// 切换运行模式时的扭矩处理策略
///
/// 设备只允许在扭矩关闭时写入运行模式（EEPROM 区域）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModeSwitchPolicy {
    /// 由调用方先关闭扭矩；否则设备拒绝写入
    #[default]
    CallerManaged,
    /// 自动关闭扭矩、写入模式，再恢复原扭矩状态
    AutoDisableTorque,
}

/// Fleet 配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FleetConfig {
    /// 期望发现的舵机数量
    pub expected: usize,
    /// 广播发现的最大尝试次数
    pub discovery_attempts: usize,
    pub mode_switch: ModeSwitchPolicy,
    pub bus: BusConfig,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            expected: 1,
            discovery_attempts: DEFAULT_DISCOVERY_ATTEMPTS,
            mode_switch: ModeSwitchPolicy::default(),
            bus: BusConfig::default(),
        }
    }
}

/// Fleet Builder
///
/// # Example
///
/// ```no_run
/// use hand_client::{FleetBuilder, ModeSwitchPolicy};
///
/// let fleet = FleetBuilder::new()
///     .port("/dev/ttyUSB0")
///     .baud_rate(1_000_000)
///     .motors(5)
///     .mode_switch_policy(ModeSwitchPolicy::AutoDisableTorque)
///     .build()
///     .unwrap();
/// println!("{:?}", fleet.ids());
/// ```
#[derive(Debug, Clone, Default)]
pub struct FleetBuilder {
    port: Option<String>,
    baud_rate: Option<u32>,
    config: FleetConfig,
}

impl FleetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置串口路径（可选，默认 `/dev/serial0`）
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// 设置波特率（可选，默认 1M）
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    /// 期望的舵机数量
    pub fn motors(mut self, expected: usize) -> Self {
        self.config.expected = expected;
        self
    }

    pub fn discovery_attempts(mut self, attempts: usize) -> Self {
        self.config.discovery_attempts = attempts;
        self
    }

    pub fn mode_switch_policy(mut self, policy: ModeSwitchPolicy) -> Self {
        self.config.mode_switch = policy;
        self
    }

    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.config.bus.receive_timeout = timeout;
        self
    }

    pub fn broadcast_window(mut self, window: Duration) -> Self {
        self.config.bus.broadcast_window = window;
        self
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// 打开串口、发现舵机并配置同步读取
    #[cfg(feature = "serial")]
    pub fn build(self) -> Result<Fleet<hand_bus::SerialBus>, ClientError> {
        let mut builder = BusBuilder::new().config(self.config.bus);
        if let Some(port) = &self.port {
            builder = builder.port(port.as_str());
        }
        if let Some(baud) = self.baud_rate {
            builder = builder.baud_rate(baud);
        }
        let bus = builder.build()?;
        Fleet::new(bus, self.config)
    }

    /// 使用已有适配器构建（测试或自定义后端）
    pub fn build_with<A: BusAdapter>(self, adapter: A) -> Result<Fleet<A>, ClientError> {
        let bus = BusBuilder::new().config(self.config.bus).build_with(adapter);
        Fleet::new(bus, self.config)
    }
}
