//! 服务端错误类型

use crate::frame::FrameError;
use crate::wire::WireError;
use hand_client::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Client(#[from] ClientError),

    /// 命令执行中出现致命错误，服务已停止
    #[error("Server stopped after fatal error: {0}")]
    Fatal(String),

    #[error("Malformed reply: {0}")]
    MalformedReply(String),
}

impl ServerError {
    /// 是否为读写超时
    pub fn is_timeout(&self) -> bool {
        match self {
            ServerError::Wire(e) => e.is_timeout(),
            ServerError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}
