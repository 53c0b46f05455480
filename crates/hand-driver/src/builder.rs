//! Builder 模式实现
//!
//! 提供链式构造 [`Bus`] 的方式。

use crate::bus::Bus;
#[cfg(feature = "serial")]
use crate::error::DriverError;
use hand_bus::BusAdapter;
use std::time::Duration;

/// 默认串口（树莓派 UART）
pub const DEFAULT_PORT: &str = "/dev/serial0";

/// 默认波特率
pub const DEFAULT_BAUD: u32 = 1_000_000;

/// 总线时序配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// 单次尝试等待状态包的超时
    pub receive_timeout: Duration,
    /// 广播 Ping / 同步读取收集回复的时间窗口
    pub broadcast_window: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_millis(50),
            broadcast_window: Duration::from_millis(500),
        }
    }
}

/// Bus Builder
///
/// # Example
///
/// ```no_run
/// use hand_driver::BusBuilder;
///
/// let bus = BusBuilder::new()
///     .port("/dev/ttyUSB0")
///     .baud_rate(57_600)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct BusBuilder {
    port: Option<String>,
    baud_rate: Option<u32>,
    config: BusConfig,
}

impl BusBuilder {
    pub fn new() -> Self {
        Self {
            port: None,
            baud_rate: None,
            config: BusConfig::default(),
        }
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

    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.config.receive_timeout = timeout;
        self
    }

    pub fn broadcast_window(mut self, window: Duration) -> Self {
        self.config.broadcast_window = window;
        self
    }

    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// 打开串口并构建总线
    ///
    /// 打开失败为致命错误（`DriverError::Transport`），不在内部重试。
    #[cfg(feature = "serial")]
    pub fn build(self) -> Result<Bus<hand_bus::SerialBus>, DriverError> {
        let port = self.port.as_deref().unwrap_or(DEFAULT_PORT);
        let baud = self.baud_rate.unwrap_or(DEFAULT_BAUD);
        let adapter = hand_bus::SerialBus::open(port, baud).inspect_err(|e| {
            tracing::error!("Failed to open serial bus {}: {}", port, e);
        })?;
        tracing::info!("Port opened and baud rate set to {}", baud);
        Ok(Bus::new(adapter, self.config))
    }

    /// 使用已有适配器构建总线（测试或自定义后端）
    pub fn build_with<A: BusAdapter>(self, adapter: A) -> Bus<A> {
        Bus::new(adapter, self.config)
    }
}

impl Default for BusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hand_bus::VirtualBus;

    #[test]
    fn test_default_config() {
        let config = BusConfig::default();
        assert_eq!(config.receive_timeout, Duration::from_millis(50));
        assert_eq!(config.broadcast_window, Duration::from_millis(500));
    }

    #[test]
    fn test_build_with_adapter() {
        let (adapter, _handle) = VirtualBus::new(DEFAULT_BAUD);
        let bus = BusBuilder::new()
            .receive_timeout(Duration::from_millis(10))
            .build_with(adapter);
        assert_eq!(bus.config().receive_timeout, Duration::from_millis(10));
        assert!(bus.is_open());
    }

    #[cfg(feature = "serial")]
    #[test]
    fn test_build_missing_port_is_transport_error() {
        let err = BusBuilder::new()
            .port("/dev/hand-driver-does-not-exist")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, DriverError::Transport(_)));
        assert!(err.is_fatal());
    }
}
