//! 命令分发服务

use super::SerialArgs;
use crate::config::CliConfig;
use anyhow::{Context, Result};
use clap::Args;
use hand_client::ModeSwitchPolicy;
use hand_server::{DEFAULT_BIND, Dispatcher, FileFrame, FrameSource, Server, StaticFrame};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::info;

/// 启动服务参数
#[derive(Args, Debug)]
pub struct ServeCommand {
    #[command(flatten)]
    pub serial: SerialArgs,

    /// 监听地址（默认 0.0.0.0:5555）
    #[arg(long)]
    pub bind: Option<String>,

    /// 外部采集进程写入的图像文件（未指定时回复占位图像）
    #[arg(long)]
    pub frame_file: Option<PathBuf>,

    /// 切换模式前自动关闭扭矩、切换后恢复
    #[arg(long)]
    pub auto_disable_torque: bool,
}

impl ServeCommand {
    pub fn execute(self, config: &CliConfig, shutdown: Arc<AtomicBool>) -> Result<()> {
        let serial = self.serial.resolve(config);
        let bind = self
            .bind
            .or_else(|| config.server.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let frame_file = self.frame_file.or_else(|| config.frame.file.clone());
        let policy = if self.auto_disable_torque {
            ModeSwitchPolicy::AutoDisableTorque
        } else {
            ModeSwitchPolicy::CallerManaged
        };

        info!(
            "Opening {} at {} bps, expecting {} actuators",
            serial.port, serial.baud, serial.motors
        );
        let fleet = serial
            .fleet_builder()
            .mode_switch_policy(policy)
            .build()
            .with_context(|| format!("初始化舵机失败: {}", serial.port))?;
        println!("✅ 已发现舵机 {:?}", fleet.ids());

        let frames: Box<dyn FrameSource> = match frame_file {
            Some(path) => {
                info!("Serving frames from {}", path.display());
                Box::new(FileFrame::new(path))
            },
            None => Box::new(StaticFrame::placeholder()),
        };

        let server = Server::bind(bind.as_str(), Dispatcher::new(fleet, frames))
            .with_context(|| format!("监听失败: {}", bind))?
            .with_shutdown(shutdown);
        println!("⏳ 服务已启动: {}（Ctrl+C 停止）", bind);

        let report = server.serve().context("服务异常退出")?;
        println!(
            "🛑 服务已停止：关闭扭矩 {:?}，失败 {:?}",
            report.disabled, report.failed
        );
        Ok(())
    }
}
