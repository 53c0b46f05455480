//! 命令分发
//!
//! [`Dispatcher`] 独占 `Fleet` 与图像来源，一次只处理一条命令：
//! `Idle` → 收到请求 → `Processing`（取帧、解析、执行）→ 回复 → `Idle`。
//! 命令错误只产生错误文本，不会中断服务。

use crate::command::Command;
use crate::frame::{FrameSource, PLACEHOLDER_JPEG};
use crate::wire::Reply;
use hand_bus::BusAdapter;
use hand_client::{BatchResult, ClientError, Fleet, Readings};
use std::fmt::Display;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// 分发器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// 等待请求
    Idle,
    /// 正在执行命令
    Processing,
}

/// 命令分发器
pub struct Dispatcher<A: BusAdapter, F: FrameSource> {
    fleet: Fleet<A>,
    frames: F,
    state: ServerState,
    fatal: Option<String>,
}

impl<A: BusAdapter, F: FrameSource> Dispatcher<A, F> {
    pub fn new(fleet: Fleet<A>, frames: F) -> Self {
        Self {
            fleet,
            frames,
            state: ServerState::Idle,
            fatal: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn fleet(&self) -> &Fleet<A> {
        &self.fleet
    }

    pub fn fleet_mut(&mut self) -> &mut Fleet<A> {
        &mut self.fleet
    }

    /// 最近一次致命错误（总线打开失败、发现失败等）
    pub fn fatal(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    pub fn into_fleet(self) -> Fleet<A> {
        self.fleet
    }

    /// 处理一条请求，恰好产生一个回复
    pub fn handle(&mut self, text: &str) -> Reply {
        self.state = ServerState::Processing;
        debug!("Processing command {:?}", text);

        let (payload, cam_t) = self.capture();

        let start = Instant::now();
        let result = self.execute(text);
        let eval_t = start.elapsed().as_secs_f64();

        self.state = ServerState::Idle;
        timed_reply(result, cam_t, eval_t, payload)
    }

    /// 请求帧完整但内容无效（非 UTF-8、携带负载等）：仍回复一条错误和一帧图像
    pub fn reject(&mut self, shown: &str, reason: &dyn Display) -> Reply {
        self.state = ServerState::Processing;
        warn!("Rejected malformed request: {}", reason);

        let (payload, cam_t) = self.capture();

        self.state = ServerState::Idle;
        timed_reply(wrong_command(shown, reason), cam_t, 0.0, payload)
    }

    fn capture(&mut self) -> (Vec<u8>, f64) {
        let start = Instant::now();
        let payload = match self.frames.capture() {
            Ok(frame) if !frame.is_empty() => frame,
            Ok(_) => {
                warn!("Frame source returned an empty frame, sending placeholder");
                PLACEHOLDER_JPEG.to_vec()
            },
            Err(e) => {
                warn!("Frame capture failed, sending placeholder: {}", e);
                PLACEHOLDER_JPEG.to_vec()
            },
        };
        (payload, start.elapsed().as_secs_f64())
    }

    /// 执行命令文本，返回结果文本（不含计时）
    pub fn execute(&mut self, text: &str) -> String {
        let command = match Command::parse(text) {
            Ok(Some(command)) => command,
            Ok(None) => return "[#]: None".to_string(),
            Err(e) => {
                warn!("Rejected command {:?}: {}", text, e);
                return wrong_command(text, &e);
            },
        };

        match self.run(command) {
            Ok(result) => result,
            Err(e) => {
                if e.is_fatal() {
                    error!("Fatal error while executing {:?}: {}", text, e);
                    self.fatal = Some(e.to_string());
                } else {
                    warn!("Command {:?} failed: {}", text, e);
                }
                wrong_command(text, &e)
            },
        }
    }

    fn run(&mut self, command: Command) -> Result<String, ClientError> {
        let fleet = &mut self.fleet;
        let result = match command {
            Command::SetLed { on, ids } => succeeded(fleet.set_led(on, ids.as_deref())),
            Command::SetTorque { enable, ids } => {
                succeeded(fleet.set_torque(enable, ids.as_deref()))
            },
            Command::GetTorque { ids } => {
                readings(&fleet.torque(ids.as_deref()), |on| (on as u8).to_string())
            },
            Command::SetMode { mode, ids } => succeeded(fleet.set_mode(mode, ids.as_deref())),
            Command::GetMode { ids } => {
                readings(&fleet.mode(ids.as_deref()), |mode| mode.index().to_string())
            },
            Command::GetVoltage { ids } => readings(&fleet.voltage(ids.as_deref()), |v| number(v.0)),
            Command::GetLoad { ids } => readings(&fleet.load(ids.as_deref()), |l| number(l.0)),
            Command::GetMotorPosition { ids } => {
                readings(&fleet.position(ids.as_deref()), |p| number(p.0))
            },
            Command::GetSyncMotorPosition => match fleet.sync_position() {
                Ok(positions) => bracket(positions.iter().map(|(_, p)| number(p.0))),
                Err(ClientError::SyncRead(e)) if !e.is_fatal() => {
                    format!("[!]: GroupSyncRead failed: {}", e)
                },
                Err(e) => return Err(e),
            },
            Command::GetVelocityLimit { ids } => {
                readings(&fleet.velocity_limit(ids.as_deref()), |v| v.to_string())
            },
            Command::SetMotorPosition { goal, ids } => {
                succeeded(fleet.set_position(goal, ids.as_deref()))
            },
            Command::SetMotorVelocity { goal, ids } => {
                succeeded(fleet.set_velocity(goal, ids.as_deref()))
            },
            Command::SetMotorPwm { goal, ids } => succeeded(fleet.set_pwm(goal, ids.as_deref())),
            Command::SetMotorBaudrate { baud, ids } => {
                succeeded(fleet.set_baud_rate(baud, ids.as_deref())?)
            },
            Command::GetMotorBaudrate { ids } => {
                readings(&fleet.baud_rate(ids.as_deref()), |b| b.bps().to_string())
            },
            Command::FindMotors { expected } => {
                let ids = fleet.discover(expected)?;
                info!("Dynamixel found ID {:?}", ids);
                bracket(ids.iter())
            },
            Command::ConfigSyncRead => {
                let ids = fleet.config_sync_read()?;
                format!("[i]: GroupSyncRead added motor {}", bracket(ids.iter()))
            },
        };
        Ok(result)
    }
}

/// 错误回复中回显的命令最多保留的字符数
const ECHO_LIMIT: usize = 128;
/// 错误原因最多保留的字符数（原因里可能带有命令名）
const REASON_LIMIT: usize = 256;

fn timed_reply(result: String, cam_t: f64, eval_t: f64, payload: Vec<u8>) -> Reply {
    Reply::new(
        format!("{} (cam_t: {:.3} eval_t: {:.3})", result, cam_t, eval_t),
        payload,
    )
}

/// `[!]: Wrong Command! '<text>' -> <reason>`，回显与原因都截断到固定长度
fn wrong_command(text: &str, reason: &dyn Display) -> String {
    format!(
        "[!]: Wrong Command! '{}' -> {}",
        clip(text, ECHO_LIMIT),
        clip(&reason.to_string(), REASON_LIMIT)
    )
}

/// 按字符截断，超长时以 `...` 结尾
fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

/// `[a, b, c]`
fn bracket<T: Display>(items: impl IntoIterator<Item = T>) -> String {
    let items: Vec<String> = items.into_iter().map(|i| i.to_string()).collect();
    format!("[{}]", items.join(", "))
}

fn succeeded(result: BatchResult) -> String {
    bracket(result.succeeded.iter())
}

/// 每个 ID 一项，失败为 `None`
fn readings<T: Copy>(readings: &Readings<T>, render: impl Fn(T) -> String) -> String {
    bracket(
        readings
            .values()
            .into_iter()
            .map(|v| v.map_or_else(|| "None".to_string(), &render)),
    )
}

/// 浮点数显示：整数值保留一位小数（`45.0`），其余按最短表示（`45.01`）
fn number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
