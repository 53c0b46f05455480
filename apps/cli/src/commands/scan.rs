//! 总线扫描

use super::SerialArgs;
use crate::config::CliConfig;
use anyhow::{Context, Result};
use clap::Args;
use hand_driver::{BusBuilder, DriverError, discover};
use hand_protocol::{BaudRate, Capabilities, Capability};

/// 广播 Ping 并列出响应的舵机
#[derive(Args, Debug)]
pub struct ScanCommand {
    #[command(flatten)]
    pub serial: SerialArgs,

    /// 依次尝试所有支持的波特率
    #[arg(long, conflicts_with = "baud")]
    pub all_bauds: bool,

    /// 每个波特率的广播次数
    #[arg(long, default_value_t = 3)]
    pub attempts: usize,
}

impl ScanCommand {
    pub fn execute(self, config: &CliConfig) -> Result<()> {
        let serial = self.serial.resolve(config);
        let bauds = if self.all_bauds {
            vec![
                BaudRate::Baud57600.bps(),
                BaudRate::Baud115200.bps(),
                BaudRate::Baud1M.bps(),
            ]
        } else {
            vec![serial.baud]
        };

        let mut total = 0;
        for baud in bauds {
            println!("⏳ 扫描 {} @ {} bps...", serial.port, baud);
            let mut bus = BusBuilder::new()
                .port(serial.port.as_str())
                .baud_rate(baud)
                .build()
                .with_context(|| format!("打开串口失败: {}", serial.port))?;

            match discover(&mut bus, serial.motors, self.attempts) {
                Ok(devices) => {
                    for device in &devices {
                        let (caps, known) = Capabilities::for_model(device.model);
                        println!(
                            "  ID {:3}  model {:4}{}  firmware 0x{:02X}  pwm {}",
                            device.id,
                            device.model,
                            if known { "" } else { " (unknown)" },
                            device.firmware,
                            if caps.contains(Capability::Pwm) { "yes" } else { "no" },
                        );
                    }
                    total += devices.len();
                },
                Err(DriverError::DiscoveryFailed { expected, found }) => {
                    println!("  期望 {} 个，仅发现 {:?}", expected, found);
                    total += found.len();
                },
                Err(e) => return Err(e).context("扫描失败"),
            }
        }

        println!("✅ 共发现 {} 个舵机", total);
        Ok(())
    }
}
