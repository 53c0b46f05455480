//! 强类型单位系统
//!
//! 使用 NewType 模式区分物理量与寄存器原始值。
//!
//! 所有换算都是线性的，写入时四舍五入到最近的寄存器单位并钳位到设备极限，
//! 读回时四舍五入到两位小数。
//!
//! # 示例
//!
//! ```rust
//! use hand_client::types::Degrees;
//!
//! let raw = Degrees(45.0).to_raw();
//! assert_eq!(raw, 512);
//! assert!((Degrees::from_raw(raw).0 - 45.0).abs() < 0.1);
//! ```

use hand_protocol::{
    LOAD_WRAP_THRESHOLD, MAX_GOAL, MAX_PWM, MAX_REVOLUTIONS, MAX_RPM, MAX_VEL,
    POSITION_UNITS_PER_TURN,
};
use std::fmt;

/// 四舍五入到两位小数
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 角度（位置）
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Degrees(pub f64);

impl Degrees {
    /// 多圈模式下可表示的最大角度（≈ 92 182°）
    pub const MAX: Self = Degrees(MAX_REVOLUTIONS * 360.0);

    /// 一个寄存器单位对应的角度
    pub const LSB: f64 = 360.0 / POSITION_UNITS_PER_TURN;

    /// 换算为目标位置寄存器值（有符号）
    pub fn to_raw(self) -> i32 {
        let raw = (self.0 * POSITION_UNITS_PER_TURN / 360.0).round();
        raw.clamp(-(MAX_GOAL as f64), MAX_GOAL as f64) as i32
    }

    /// 由当前位置寄存器值换算
    pub fn from_raw(raw: i32) -> Self {
        let raw = raw.clamp(-MAX_GOAL, MAX_GOAL);
        Degrees(round2(raw as f64 * 360.0 / POSITION_UNITS_PER_TURN))
    }

    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Degrees {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.0)
    }
}

/// 转速（rpm）
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rpm(pub f64);

impl Rpm {
    pub fn to_raw(self) -> i32 {
        let raw = (self.0 * MAX_VEL as f64 / MAX_RPM).round();
        raw.clamp(-(MAX_VEL as f64), MAX_VEL as f64) as i32
    }

    pub fn from_raw(raw: i32) -> Self {
        let raw = raw.clamp(-MAX_VEL, MAX_VEL);
        Rpm(round2(raw as f64 * MAX_RPM / MAX_VEL as f64))
    }
}

impl fmt::Display for Rpm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rpm", self.0)
    }
}

/// PWM 占空比（%）
///
/// 正常范围 [0, 100]。负值表示反向，寄存器接收 16 位补码，钳位到 [-885, 885]。
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PwmPercent(pub f64);

impl PwmPercent {
    pub fn to_raw(self) -> i32 {
        let raw = (self.0 / 100.0 * MAX_PWM as f64).round();
        raw.clamp(-(MAX_PWM as f64), MAX_PWM as f64) as i32
    }

    pub fn from_raw(raw: i32) -> Self {
        let raw = raw.clamp(-MAX_PWM, MAX_PWM);
        PwmPercent(round2(raw as f64 / MAX_PWM as f64 * 100.0))
    }
}

impl fmt::Display for PwmPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// 负载（%，幅值）
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoadPercent(pub f64);

impl LoadPercent {
    /// 原始值超过 1000 表示反向负载，幅值为 `65535 - raw`
    pub fn from_raw(raw: u16) -> Self {
        let magnitude = if raw > LOAD_WRAP_THRESHOLD {
            u16::MAX - raw
        } else {
            raw
        };
        LoadPercent(round2(magnitude as f64 / 10.0))
    }
}

impl fmt::Display for LoadPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// 电压（V）
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Volts(pub f64);

impl Volts {
    pub fn from_raw(raw: u16) -> Self {
        Volts(round2(raw as f64 / 10.0))
    }
}

impl fmt::Display for Volts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} V", self.0)
    }
}
