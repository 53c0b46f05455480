//! 状态包错误字节
//!
//! 协议定义：
//! - Bit 0-6: 错误编号
//! - Bit 7: 硬件告警（Alert）
//!
//! 错误字节非零即视为设备报告故障，即便总线交换本身成功。

use bilge::prelude::*;
use std::fmt;

/// 状态包错误字节（位域）
///
/// bilge 默认 LSB first 位序，与协议一致。
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct StatusError {
    pub code: u7,    // Bit 0-6: 错误编号
    pub alert: bool, // Bit 7: 硬件告警
}

impl StatusError {
    /// 错误编号
    pub fn error_code(&self) -> DeviceErrorCode {
        DeviceErrorCode::from(self.code().value())
    }

    /// 原始字节
    pub fn raw(&self) -> u8 {
        u8::from(*self)
    }

    /// 是否无任何错误
    pub fn is_ok(&self) -> bool {
        self.raw() == 0
    }
}

/// 设备错误编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::FromPrimitive)]
#[repr(u8)]
pub enum DeviceErrorCode {
    None = 0,
    ResultFail = 1,
    InstructionError = 2,
    CrcError = 3,
    DataRangeError = 4,
    DataLengthError = 5,
    DataLimitError = 6,
    AccessError = 7,
    #[num_enum(default)]
    Unknown = 0x7F,
}

impl fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DeviceErrorCode::None => "No error",
            DeviceErrorCode::ResultFail => "Failed to process the instruction packet",
            DeviceErrorCode::InstructionError => "Undefined instruction",
            DeviceErrorCode::CrcError => "CRC does not match",
            DeviceErrorCode::DataRangeError => "Data out of range",
            DeviceErrorCode::DataLengthError => "Data length mismatch",
            DeviceErrorCode::DataLimitError => "Data exceeds limit",
            DeviceErrorCode::AccessError => "Access denied",
            DeviceErrorCode::Unknown => "Unknown error",
        };
        f.write_str(text)
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.error_code(), self.raw())?;
        if self.alert() {
            f.write_str(" [hardware alert]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_zero() {
        let err = StatusError::from(0u8);
        assert!(err.is_ok());
        assert!(!err.alert());
        assert_eq!(err.error_code(), DeviceErrorCode::None);
    }

    #[test]
    fn test_status_error_access() {
        let err = StatusError::from(0x07u8);
        assert!(!err.is_ok());
        assert_eq!(err.error_code(), DeviceErrorCode::AccessError);
        assert_eq!(err.raw(), 0x07);
    }

    #[test]
    fn test_status_error_alert_bit() {
        // 仅告警位：错误编号为 0，但仍然不是成功
        let err = StatusError::from(0x80u8);
        assert!(err.alert());
        assert_eq!(err.error_code(), DeviceErrorCode::None);
        assert!(!err.is_ok());
        assert!(err.to_string().contains("hardware alert"));
    }

    #[test]
    fn test_unknown_code() {
        let err = StatusError::from(0x22u8);
        assert_eq!(err.error_code(), DeviceErrorCode::Unknown);
        assert!(err.to_string().contains("0x22"));
    }
}
