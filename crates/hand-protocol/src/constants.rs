//! 协议常量定义
//!
//! 包头、特殊 ID、指令码以及舵机的物理极限值。

use num_enum::{IntoPrimitive, TryFromPrimitive};

// ============================================================================
// 包结构
// ============================================================================

/// 包头（含保留字节）：`FF FF FD 00`
pub const HEADER: [u8; 4] = [0xFF, 0xFF, 0xFD, 0x00];

/// 字节填充标记：参数区中出现 `FF FF FD` 时追加的字节
pub const STUFFING_BYTE: u8 = 0xFD;

/// 包头 + ID + 长度字段的字节数
pub const PREFIX_LEN: usize = 7;

/// CRC 字段字节数
pub const CRC_LEN: usize = 2;

/// 单个包允许的最大长度字段值（防止异常长度导致无限等待）
pub const MAX_PACKET_LEN: usize = 1024;

// ============================================================================
// ID
// ============================================================================

/// 广播 ID（保留，只用于发现/Ping，不分配给真实设备）
pub const BROADCAST_ID: u8 = 254;

/// 最大可分配设备 ID
pub const MAX_ID: u8 = 253;

// ============================================================================
// 指令码
// ============================================================================

/// 指令码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    RegWrite = 0x04,
    Action = 0x05,
    FactoryReset = 0x06,
    Reboot = 0x08,
    Clear = 0x10,
    /// 状态包（设备 → 主机）
    Status = 0x55,
    SyncRead = 0x82,
    SyncWrite = 0x83,
    BulkRead = 0x92,
    BulkWrite = 0x93,
}

// ============================================================================
// 设备型号
// ============================================================================

/// MX-28 (Protocol 2.0)
pub const MODEL_MX_28: u16 = 30;
/// MX-64 (Protocol 2.0)
pub const MODEL_MX_64: u16 = 311;
/// MX-106 (Protocol 2.0)
pub const MODEL_MX_106: u16 = 321;
/// XL-320（无 PWM 模式）
pub const MODEL_XL_320: u16 = 350;

// ============================================================================
// 物理极限
// ============================================================================

/// 一圈对应的寄存器单位（4095 == 360°）
pub const POSITION_UNITS_PER_TURN: f64 = 4095.0;

/// 最大目标位置（多圈模式）
pub const MAX_GOAL: i32 = 1_048_575;

/// 最大圈数（≈256）
pub const MAX_REVOLUTIONS: f64 = MAX_GOAL as f64 / POSITION_UNITS_PER_TURN;

/// 最大 PWM 寄存器值
pub const MAX_PWM: i32 = 885;

/// 最大速度寄存器值（对应 229 rpm）
pub const MAX_VEL: i32 = 1023;

/// 最大转速（rpm）
pub const MAX_RPM: f64 = 229.0;

/// 负载原始值回绕阈值：超过此值表示反向负载
pub const LOAD_WRAP_THRESHOLD: u16 = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_codes() {
        assert_eq!(u8::from(Instruction::Ping), 0x01);
        assert_eq!(u8::from(Instruction::SyncRead), 0x82);
        assert_eq!(Instruction::try_from(0x55).unwrap(), Instruction::Status);
        assert!(Instruction::try_from(0x07).is_err());
    }

    #[test]
    fn test_max_revolutions() {
        assert!((MAX_REVOLUTIONS - 256.06).abs() < 0.01);
    }

    #[test]
    fn test_broadcast_id_not_assignable() {
        assert!(BROADCAST_ID > MAX_ID);
    }
}
