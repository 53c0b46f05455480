//! # Hand Protocol
//!
//! 智能舵机串行总线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 协议常量、指令码、设备极限值
//! - `registers`: 控制表寄存器描述符、运行模式表、波特率表
//! - `packet`: 指令包/状态包编解码（包头、字节填充、CRC-16）
//! - `status`: 状态包错误字节解析
//!
//! ## 字节序
//!
//! 协议使用小端字节序（LSB 在前），包括长度字段、地址字段、寄存器数据和 CRC。
//! 本模块提供了字节序转换工具函数。

pub mod constants;
pub mod packet;
pub mod registers;
pub mod status;

// 重新导出常用类型
pub use constants::*;
pub use packet::{InstructionPacket, PacketDecoder, RawFrame, StatusPacket, crc16};
pub use registers::{
    Access, BaudRate, Capabilities, Capability, OperatingMode, Register, RegisterWidth, map,
};
pub use status::{DeviceErrorCode, StatusError};

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid packet length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    Checksum { expected: u16, actual: u16 },

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Invalid instruction: 0x{value:02X}")]
    InvalidInstruction { value: u8 },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: u32 },

    #[error("Value {value} does not fit register {register} ({width} bytes)")]
    WidthMismatch {
        register: &'static str,
        width: usize,
        value: u32,
    },

    #[error("Register {register} is not {access}")]
    AccessDenied {
        register: &'static str,
        access: &'static str,
    },

    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaud(u32),
}

/// 小端字节序转 u16
pub fn bytes_to_u16_le(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

/// 小端字节序转 u32
pub fn bytes_to_u32_le(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

/// u16 转小端字节序
pub fn u16_to_bytes_le(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

/// u32 转小端字节序
pub fn u32_to_bytes_le(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_u16_le() {
        assert_eq!(bytes_to_u16_le([0x34, 0x12]), 0x1234);
    }

    #[test]
    fn test_bytes_to_u32_le() {
        assert_eq!(bytes_to_u32_le([0x78, 0x56, 0x34, 0x12]), 0x12345678);
    }

    #[test]
    fn test_u32_to_bytes_le_negative() {
        // 有符号值按补码传输
        let bytes = u32_to_bytes_le((-1i32) as u32);
        assert_eq!(bytes, [0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::Checksum {
            expected: 0x4E19,
            actual: 0x0000,
        };
        assert_eq!(
            err.to_string(),
            "CRC mismatch: expected 0x4E19, got 0x0000"
        );

        let err = ProtocolError::WidthMismatch {
            register: "LED",
            width: 1,
            value: 300,
        };
        assert!(err.to_string().contains("LED"));
    }
}
