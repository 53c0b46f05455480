//! 命令定义和实现

pub mod call;
pub mod config;
pub mod monitor;
pub mod scan;
pub mod serve;

pub use call::CallCommand;
pub use config::ConfigCommand;
pub use monitor::MonitorCommand;
pub use scan::ScanCommand;
pub use serve::ServeCommand;

use crate::config::CliConfig;
use clap::Args;
use hand_client::FleetBuilder;
use hand_driver::{DEFAULT_BAUD, DEFAULT_PORT};
use hand_server::{DEFAULT_TIMEOUT, HandClient};
use std::time::Duration;

/// 客户端默认连接地址
pub const DEFAULT_CONNECT: &str = "127.0.0.1:5555";

/// 串口参数（未指定时取配置文件，再取默认值）
#[derive(Args, Debug, Clone, Default)]
pub struct SerialArgs {
    /// 串口路径（如 /dev/ttyUSB0）
    #[arg(short, long)]
    pub port: Option<String>,

    /// 波特率（57600, 115200, 1000000）
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// 期望舵机数量
    #[arg(short, long)]
    pub motors: Option<usize>,
}

/// 合并后的串口参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub port: String,
    pub baud: u32,
    pub motors: usize,
}

impl SerialArgs {
    pub fn resolve(&self, config: &CliConfig) -> SerialSettings {
        SerialSettings {
            port: self
                .port
                .clone()
                .or_else(|| config.serial.port.clone())
                .unwrap_or_else(|| DEFAULT_PORT.to_string()),
            baud: self.baud.or(config.serial.baud).unwrap_or(DEFAULT_BAUD),
            motors: self.motors.or(config.serial.motors).unwrap_or(1),
        }
    }
}

impl SerialSettings {
    pub fn fleet_builder(&self) -> FleetBuilder {
        FleetBuilder::new()
            .port(self.port.as_str())
            .baud_rate(self.baud)
            .motors(self.motors)
    }
}

/// 服务连接参数
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    /// 服务地址（HOST:PORT）
    #[arg(short, long)]
    pub connect: Option<String>,

    /// 收发超时（毫秒）
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl ConnectArgs {
    pub fn client(&self, config: &CliConfig) -> HandClient {
        let addr = self
            .connect
            .clone()
            .or_else(|| config.server.connect.clone())
            .unwrap_or_else(|| DEFAULT_CONNECT.to_string());
        let timeout = self
            .timeout_ms
            .map(Duration::from_millis)
            .or_else(|| config.timeout())
            .unwrap_or(DEFAULT_TIMEOUT);
        HandClient::new(addr).with_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file() {
        let mut config = CliConfig::default();
        config.serial.port = Some("/dev/ttyUSB1".into());
        config.serial.baud = Some(57_600);
        config.server.connect = Some("10.0.0.2:5555".into());
        config.server.timeout_ms = Some(1000);

        let args = SerialArgs {
            port: None,
            baud: Some(115_200),
            motors: None,
        };
        assert_eq!(
            args.resolve(&config),
            SerialSettings {
                port: "/dev/ttyUSB1".into(),
                baud: 115_200,
                motors: 1,
            }
        );

        let client = ConnectArgs::default().client(&config);
        assert_eq!(client.addr(), "10.0.0.2:5555");
        assert_eq!(client.timeout(), Duration::from_millis(1000));

        let client = ConnectArgs {
            connect: Some("127.0.0.1:6000".into()),
            timeout_ms: None,
        }
        .client(&CliConfig::default());
        assert_eq!(client.addr(), "127.0.0.1:6000");
        assert_eq!(client.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_defaults() {
        let settings = SerialArgs::default().resolve(&CliConfig::default());
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.baud, DEFAULT_BAUD);
    }
}
