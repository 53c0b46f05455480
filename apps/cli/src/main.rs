//! # Hand CLI
//!
//! Command-line interface for servo-driven prosthetic hands.
//!
//! ## 服务端（连接舵机总线的主机）
//!
//! ```bash
//! # 配置默认串口
//! hand-cli config set --port /dev/ttyUSB0 --motors 5
//!
//! # 发现舵机、启动命令服务（Ctrl+C 停止并关闭扭矩）
//! hand-cli serve --bind 0.0.0.0:5555
//! ```
//!
//! ## 客户端
//!
//! ```bash
//! hand-cli call "set_torque(1)" --connect 192.168.1.10:5555
//! hand-cli monitor --connect 192.168.1.10:5555
//!
//! $ hand-cli shell
//! hand> set_motor_position(45, [1, 2])
//! hand> get_motor_position()
//! hand> exit
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod repl;

use commands::{CallCommand, ConfigCommand, ConnectArgs, MonitorCommand, ScanCommand, ServeCommand};
use config::CliConfig;
use repl::run_repl;

/// Hand CLI - 假肢手舵机命令行工具
#[derive(Parser, Debug)]
#[command(name = "hand-cli")]
#[command(about = "Command-line interface for servo-driven prosthetic hands", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 <config_dir>/hand/config.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 发现舵机并启动命令服务
    Serve {
        #[command(flatten)]
        args: ServeCommand,
    },

    /// 发送一条命令
    Call {
        #[command(flatten)]
        args: CallCommand,
    },

    /// 启动交互式 Shell（REPL 模式）
    Shell {
        #[command(flatten)]
        args: ConnectArgs,
    },

    /// 轮询监控舵机状态
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },

    /// 扫描总线上的舵机
    Scan {
        #[command(flatten)]
        args: ScanCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志（输出到 stderr，stdout 只留命令结果）
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hand_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config::default_path()?,
    };

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&config_path),

        Commands::Serve { args } => {
            let config = CliConfig::load(&config_path)?;
            let shutdown = install_shutdown_handler()?;
            args.execute(&config, shutdown)
        },

        Commands::Call { args } => {
            let config = CliConfig::load(&config_path)?;
            args.execute(&config)
        },

        Commands::Shell { args } => {
            let config = CliConfig::load(&config_path)?;
            run_repl(args.client(&config))
        },

        Commands::Monitor { args } => {
            let config = CliConfig::load(&config_path)?;
            let shutdown = install_shutdown_handler()?;
            args.execute(&config, &shutdown)
        },

        Commands::Scan { args } => {
            let config = CliConfig::load(&config_path)?;
            args.execute(&config)
        },
    }
}

/// Ctrl+C 只置位关闭标志，由主循环在请求之间退出并执行收尾
fn install_shutdown_handler() -> Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt signal. Shutting down...");
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;
    Ok(shutdown)
}
