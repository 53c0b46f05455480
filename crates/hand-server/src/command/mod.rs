//! 命令解析与白名单
//!
//! 命令文本先由 [`parser`] 解析为只含字面量的调用，再经 [`table`] 白名单
//! 绑定参数、校验类型，得到强类型的 [`Command`]。

pub mod parser;
pub mod table;

pub use parser::{Call, Value};
pub use table::{COMMANDS, CommandSpec, ParamKind, ParamSpec};

use hand_client::{BaudRate, Degrees, OperatingMode, PwmPercent, Rpm};
use thiserror::Error;

/// 命令解析错误（可恢复，服务端回复错误文本后继续）
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("syntax error at {position}: {reason}")]
    Syntax { position: usize, reason: String },

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("{command}() takes at most {max} argument(s), {given} given")]
    TooManyArguments {
        command: &'static str,
        max: usize,
        given: usize,
    },

    #[error("{command}() got an unexpected keyword argument '{name}'")]
    UnknownArgument { command: &'static str, name: String },

    #[error("{command}() got multiple values for argument '{name}'")]
    DuplicateArgument {
        command: &'static str,
        name: &'static str,
    },

    #[error("{command}() missing required argument '{name}'")]
    MissingArgument {
        command: &'static str,
        name: &'static str,
    },

    #[error("{command}() invalid argument '{name}': {reason}")]
    InvalidArgument {
        command: &'static str,
        name: &'static str,
        reason: String,
    },
}

/// 白名单内的命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetLed { on: bool, ids: Option<Vec<u8>> },
    SetTorque { enable: bool, ids: Option<Vec<u8>> },
    GetTorque { ids: Option<Vec<u8>> },
    SetMode { mode: OperatingMode, ids: Option<Vec<u8>> },
    GetMode { ids: Option<Vec<u8>> },
    GetVoltage { ids: Option<Vec<u8>> },
    GetLoad { ids: Option<Vec<u8>> },
    GetMotorPosition { ids: Option<Vec<u8>> },
    GetSyncMotorPosition,
    GetVelocityLimit { ids: Option<Vec<u8>> },
    SetMotorPosition { goal: Degrees, ids: Option<Vec<u8>> },
    SetMotorVelocity { goal: Rpm, ids: Option<Vec<u8>> },
    SetMotorPwm { goal: PwmPercent, ids: Option<Vec<u8>> },
    SetMotorBaudrate { baud: BaudRate, ids: Option<Vec<u8>> },
    GetMotorBaudrate { ids: Option<Vec<u8>> },
    FindMotors { expected: Option<usize> },
    ConfigSyncRead,
}

impl Command {
    /// 解析命令文本
    ///
    /// 空文本或 `none`（不区分大小写）是保活请求，返回 `Ok(None)`。
    pub fn parse(text: &str) -> Result<Option<Self>, CommandError> {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case("none") {
            return Ok(None);
        }
        let call = parser::parse(text)?;
        table::resolve(&call).map(Some)
    }

    /// 是否只读（不改变舵机状态）
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Command::GetTorque { .. }
                | Command::GetMode { .. }
                | Command::GetVoltage { .. }
                | Command::GetLoad { .. }
                | Command::GetMotorPosition { .. }
                | Command::GetSyncMotorPosition
                | Command::GetVelocityLimit { .. }
                | Command::GetMotorBaudrate { .. }
        )
    }
}
