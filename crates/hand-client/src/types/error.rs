//! 错误类型体系
//!
//! 区分致命错误（总线打开失败、发现失败、总线已关闭）与可恢复错误。
//! 批量操作中单个 ID 的失败只是一个值，不会中断其余 ID。

use hand_driver::{DriverError, SyncReadError, TransactionFailure};
use hand_protocol::{Capability, ProtocolError};
use thiserror::Error;

/// 客户端错误类型
#[derive(Debug, Error)]
pub enum ClientError {
    // ==================== Fatal Errors ====================
    /// 驱动层错误（打开失败、发现失败等）
    #[error(transparent)]
    Driver(#[from] DriverError),

    // ==================== Recoverable Errors ====================
    /// 单寄存器事务失败（已分类）
    #[error(transparent)]
    Transaction(#[from] TransactionFailure),

    /// 同步读取失败
    #[error("{0}")]
    SyncRead(#[from] SyncReadError),

    /// 设备返回了码表之外的值
    #[error("Actuator {id} reported unknown {field} code {value}")]
    UnknownCode {
        id: u8,
        field: &'static str,
        value: u32,
    },

    /// 读取事务成功但没有带回数据
    #[error("Actuator {id} returned no data for {field}")]
    MissingValue { id: u8, field: &'static str },

    /// 型号不支持该能力
    #[error("Actuator {id} does not support {capability:?} control")]
    Unsupported { id: u8, capability: Capability },

    /// ID 不在已发现的设备中
    #[error("Unknown actuator id {0}")]
    UnknownActuator(u8),

    /// 参数校验失败
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// 是否对当前会话致命
    pub fn is_fatal(&self) -> bool {
        match self {
            ClientError::Driver(e) => e.is_fatal(),
            ClientError::Transaction(f) => f.is_fatal(),
            ClientError::SyncRead(e) => e.is_fatal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::Unsupported {
            id: 4,
            capability: Capability::Pwm,
        };
        assert_eq!(err.to_string(), "Actuator 4 does not support Pwm control");
        assert!(!err.is_fatal());

        let err = ClientError::Driver(DriverError::DiscoveryFailed {
            expected: 2,
            found: vec![],
        });
        assert!(err.is_fatal());

        let err = ClientError::MissingValue {
            id: 3,
            field: "present_position",
        };
        assert_eq!(err.to_string(), "Actuator 3 returned no data for present_position");
        assert!(!err.is_fatal());
    }
}
