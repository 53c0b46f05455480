//! # Hand Bus Adapter Layer
//!
//! 半双工舵机总线的硬件抽象层。
//!
//! 总线由主机驱动：一次只允许一个交换（发送指令包、等待状态包）在进行中，
//! 这一点通过所有交换方法都要求 `&mut self` 在类型层面保证。
//!
//! ## 后端
//!
//! - `SerialBus`（feature `serial`，默认启用）：真实串口
//! - `VirtualBus`（feature `mock`）：进程内模拟舵机，带故障注入

use hand_protocol::{InstructionPacket, ProtocolError, StatusPacket};
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(feature = "serial")]
pub use serial::SerialBus;

#[cfg(any(test, feature = "mock"))]
pub mod virtual_bus;

#[cfg(any(test, feature = "mock"))]
pub use virtual_bus::{VirtualBus, VirtualBusHandle, VirtualServo};

/// 单次接收的默认超时
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(50);

/// 总线适配层统一错误类型
#[derive(Error, Debug)]
pub enum BusError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to open port {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("Read timeout")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Bus is closed")]
    Closed,

    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaud(u32),
}

impl BusError {
    /// 是否为不可重试的致命错误（打开/配置失败、总线已关闭）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BusError::Open { .. } | BusError::Closed | BusError::UnsupportedBaud(_)
        )
    }
}

/// 总线适配器
pub trait BusAdapter {
    /// 发送一个指令包
    fn send(&mut self, packet: &InstructionPacket) -> Result<(), BusError>;

    /// 接收一个状态包（阻塞直到超时）
    fn receive(&mut self) -> Result<StatusPacket, BusError>;

    /// 设置 `receive()` 的超时
    fn set_receive_timeout(&mut self, _timeout: Duration) {}

    fn receive_timeout(&mut self, timeout: Duration) -> Result<StatusPacket, BusError> {
        self.set_receive_timeout(timeout);
        self.receive()
    }

    /// 丢弃接收缓冲中的残留字节
    fn clear(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    /// 以新波特率重新打开总线
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), BusError>;

    /// 当前波特率
    fn baud_rate(&self) -> u32;

    /// 关闭总线（幂等）
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

impl<A: BusAdapter + ?Sized> BusAdapter for Box<A> {
    fn send(&mut self, packet: &InstructionPacket) -> Result<(), BusError> {
        (**self).send(packet)
    }

    fn receive(&mut self) -> Result<StatusPacket, BusError> {
        (**self).receive()
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        (**self).set_receive_timeout(timeout)
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<StatusPacket, BusError> {
        (**self).receive_timeout(timeout)
    }

    fn clear(&mut self) -> Result<(), BusError> {
        (**self).clear()
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), BusError> {
        (**self).set_baud_rate(baud)
    }

    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(BusError::Closed.is_fatal());
        assert!(BusError::UnsupportedBaud(9600).is_fatal());
        assert!(
            BusError::Open {
                port: "/dev/null".into(),
                reason: "busy".into()
            }
            .is_fatal()
        );
        assert!(!BusError::Timeout.is_fatal());
        assert!(!BusError::Protocol(ProtocolError::Framing("x".into())).is_fatal());
    }

    #[test]
    fn test_boxed_adapter_forwards() {
        let (bus, handle) = VirtualBus::with_servos(1_000_000, &[1]);
        let mut boxed: Box<dyn BusAdapter> = Box::new(bus);
        boxed.send(&InstructionPacket::ping(1)).unwrap();
        let status = boxed.receive().unwrap();
        assert_eq!(status.id, 1);
        assert_eq!(boxed.baud_rate(), 1_000_000);
        boxed.close();
        assert!(!boxed.is_open());
        assert!(!handle.is_open());
    }
}
