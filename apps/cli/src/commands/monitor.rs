//! 监控模式
//!
//! 按节拍轮流刷新位置/负载/扭矩/模式，节拍之间发送排队命令或空命令保活。

use super::ConnectArgs;
use crate::config::CliConfig;
use anyhow::Result;
use clap::Args;
use hand_server::{MotorView, StepOutcome, Supervisor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// 监控参数
#[derive(Args, Debug)]
pub struct MonitorCommand {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// 显示的舵机数量
    #[arg(long)]
    pub motors: Option<usize>,

    /// 刷新节拍（毫秒）
    #[arg(long, default_value_t = 250)]
    pub tick_ms: u64,

    /// 启动后排队发送的命令（可重复）
    #[arg(short = 'x', long = "exec")]
    pub exec: Vec<String>,

    /// 执行指定刷新次数后退出
    #[arg(long)]
    pub refreshes: Option<usize>,
}

impl MonitorCommand {
    pub fn execute(self, config: &CliConfig, shutdown: &AtomicBool) -> Result<()> {
        let tick = Duration::from_millis(self.tick_ms);
        let motors = self.motors.or(config.serial.motors).unwrap_or(1);
        let client = self.connect.client(config);
        println!("⏳ 监控 {}（Ctrl+C 退出）", client.addr());

        let mut supervisor = Supervisor::new(client, motors).with_tick(tick);
        for command in self.exec {
            supervisor.submit(command);
        }

        let mut refreshed = 0;
        while !shutdown.load(Ordering::SeqCst) {
            if self.refreshes.is_some_and(|limit| refreshed >= limit) {
                break;
            }
            match supervisor.step() {
                Ok(StepOutcome::Refreshed { op, .. }) => {
                    refreshed += 1;
                    println!("[{:?}] {}", op, render(supervisor.motors()));
                },
                Ok(StepOutcome::Command { command, reply }) => {
                    if command.is_empty() {
                        // 保活之间让出一点时间
                        thread::sleep(tick / 10);
                    } else {
                        println!("> {}\n{}", command, reply.text);
                    }
                },
                Err(e) => {
                    warn!("Supervisor step failed: {}", e);
                    thread::sleep(tick);
                },
            }
        }
        Ok(())
    }
}

/// 每个舵机一段：`#1 45.01° 3.2% on POSITION`
fn render(motors: &[MotorView]) -> String {
    motors
        .iter()
        .enumerate()
        .map(|(i, m)| {
            format!(
                "#{} {} {} {} {}",
                i + 1,
                m.position.map_or("-".to_string(), |p| format!("{:.2}°", p)),
                m.load.map_or("-".to_string(), |l| format!("{:.1}%", l)),
                match m.torque {
                    Some(true) => "on",
                    Some(false) => "off",
                    None => "-",
                },
                m.mode.map_or("-", |mode| mode.name()),
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}
