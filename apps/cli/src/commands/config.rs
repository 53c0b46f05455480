//! 配置管理命令
//!
//! 用于管理 CLI 配置（串口、服务地址、图像文件）

use crate::config::{CliConfig, KEYS};
use anyhow::Result;
use clap::Subcommand;
use std::path::{Path, PathBuf};

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// 串口路径
        #[arg(long)]
        port: Option<String>,

        /// 波特率（bps）
        #[arg(long)]
        baud: Option<u32>,

        /// 期望舵机数量
        #[arg(long)]
        motors: Option<usize>,

        /// 服务监听地址
        #[arg(long)]
        bind: Option<String>,

        /// 客户端连接地址
        #[arg(long)]
        connect: Option<String>,

        /// 客户端超时（毫秒）
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// 图像文件
        #[arg(long)]
        frame_file: Option<PathBuf>,
    },

    /// 获取配置项
    Get {
        /// 配置项名称（如 serial.port），默认全部
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置
    Check,
}

impl ConfigCommand {
    pub fn execute(self, path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Set {
                port,
                baud,
                motors,
                bind,
                connect,
                timeout_ms,
                frame_file,
            } => {
                let mut config = CliConfig::load(path)?;
                let mut changed = false;
                let mut apply = |key: &str, shown: Option<String>| {
                    if let Some(value) = shown {
                        println!("✅ 设置 {} = {}", key, value);
                        changed = true;
                    }
                };

                apply("serial.port", port.clone());
                apply("serial.baud", baud.map(|v| v.to_string()));
                apply("serial.motors", motors.map(|v| v.to_string()));
                apply("server.bind", bind.clone());
                apply("server.connect", connect.clone());
                apply("server.timeout_ms", timeout_ms.map(|v| v.to_string()));
                apply(
                    "frame.file",
                    frame_file.as_ref().map(|p| p.display().to_string()),
                );

                if !changed {
                    anyhow::bail!("未指定任何配置项（使用 --help 查看可用选项）");
                }

                config.serial.port = port.or(config.serial.port);
                config.serial.baud = baud.or(config.serial.baud);
                config.serial.motors = motors.or(config.serial.motors);
                config.server.bind = bind.or(config.server.bind);
                config.server.connect = connect.or(config.server.connect);
                config.server.timeout_ms = timeout_ms.or(config.server.timeout_ms);
                config.frame.file = frame_file.or(config.frame.file);

                for problem in config.check() {
                    eprintln!("⚠️  {}", problem);
                }
                config.save(path)
            },

            ConfigCommand::Get { key } => {
                let config = CliConfig::load(path)?;
                if key == "all" {
                    println!("Hand CLI 配置:");
                    for key in KEYS {
                        println!("  {}: {}", key, shown(config.get(key)?));
                    }
                } else {
                    println!("{}", shown(config.get(&key)?));
                }
                Ok(())
            },

            ConfigCommand::Check => {
                let config = CliConfig::load(path)?;
                println!("配置文件: {}", path.display());
                if !path.exists() {
                    println!("  (文件不存在，使用默认值)");
                }
                let problems = config.check();
                if problems.is_empty() {
                    println!("✅ 配置有效");
                    Ok(())
                } else {
                    for problem in &problems {
                        println!("❌ {}", problem);
                    }
                    anyhow::bail!("发现 {} 个配置问题", problems.len())
                }
            },
        }
    }
}

fn shown(value: Option<String>) -> String {
    value.unwrap_or_else(|| "(未设置)".to_string())
}
