//! 驱动层错误类型定义

use crate::poll_group::SyncReadError;
use crate::transaction::TransactionFailure;
use hand_bus::BusError;
use hand_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
///
/// 只有 `Transport`（打开/配置失败）与 `DiscoveryFailed` 对会话是致命的，
/// 其余错误都是可恢复的值。
#[derive(Error, Debug)]
pub enum DriverError {
    /// 总线打开/配置失败
    #[error("Transport error: {0}")]
    Transport(#[from] BusError),

    /// 单寄存器事务重试耗尽
    #[error(transparent)]
    Transaction(#[from] TransactionFailure),

    /// 发现阶段响应设备数不足
    #[error("Discovery failed: expected {expected} actuators, found {found:?}")]
    DiscoveryFailed { expected: usize, found: Vec<u8> },

    /// 同步读取失败
    #[error("Sync read error: {0}")]
    SyncRead(#[from] SyncReadError),

    /// 协议错误（寄存器宽度/权限校验等）
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl DriverError {
    /// 是否对当前会话致命
    pub fn is_fatal(&self) -> bool {
        match self {
            DriverError::Transport(_) | DriverError::DiscoveryFailed { .. } => true,
            DriverError::Transaction(failure) => failure.is_fatal(),
            DriverError::SyncRead(SyncReadError::Transport(_)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::DiscoveryFailed {
            expected: 5,
            found: vec![1, 3],
        };
        assert_eq!(
            err.to_string(),
            "Discovery failed: expected 5 actuators, found [1, 3]"
        );
        assert!(err.is_fatal());

        let err = DriverError::Transport(BusError::Open {
            port: "/dev/ttyUSB0".into(),
            reason: "No such file or directory".into(),
        });
        assert!(err.to_string().contains("/dev/ttyUSB0"));
        assert!(err.is_fatal());

        let err = DriverError::Protocol(ProtocolError::UnsupportedBaud(9600));
        assert!(!err.is_fatal());
    }
}
