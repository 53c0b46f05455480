//! 控制表寄存器定义
//!
//! 寄存器描述符是不可变的 `(地址, 宽度, 访问权限)` 三元组，
//! 同一型号的所有舵机共享同一份只读描述。

use crate::ProtocolError;
use crate::constants::{MODEL_MX_28, MODEL_MX_64, MODEL_MX_106, MODEL_XL_320};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use smallvec::SmallVec;

// ============================================================================
// 寄存器描述符
// ============================================================================

/// 寄存器访问权限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn is_readable(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// 寄存器宽度（只允许 1/2/4 字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RegisterWidth {
    One = 1,
    Two = 2,
    Four = 4,
}

impl RegisterWidth {
    /// 字节数
    pub fn bytes(self) -> usize {
        self as usize
    }

    /// 该宽度能表示的最大无符号值
    pub fn max_value(self) -> u32 {
        match self {
            RegisterWidth::One => u8::MAX as u32,
            RegisterWidth::Two => u16::MAX as u32,
            RegisterWidth::Four => u32::MAX,
        }
    }
}

/// 寄存器描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub name: &'static str,
    pub address: u16,
    pub width: RegisterWidth,
    pub access: Access,
}

impl Register {
    pub const fn new(
        name: &'static str,
        address: u16,
        width: RegisterWidth,
        access: Access,
    ) -> Self {
        Self {
            name,
            address,
            width,
            access,
        }
    }

    /// 按声明宽度编码写入值（小端）
    ///
    /// 值必须严格落在宽度范围内；有符号值由调用者先转为对应宽度的补码。
    ///
    /// # 错误
    /// - `ProtocolError::AccessDenied`: 寄存器不可写
    /// - `ProtocolError::WidthMismatch`: 值超出声明宽度
    pub fn encode(&self, value: u32) -> Result<SmallVec<[u8; 4]>, ProtocolError> {
        if !self.access.is_writable() {
            return Err(ProtocolError::AccessDenied {
                register: self.name,
                access: "writable",
            });
        }
        if value > self.width.max_value() {
            return Err(ProtocolError::WidthMismatch {
                register: self.name,
                width: self.width.bytes(),
                value,
            });
        }
        Ok(SmallVec::from_slice(
            &value.to_le_bytes()[..self.width.bytes()],
        ))
    }

    /// 将读取的原始字节解释为声明宽度的无符号小端整数
    pub fn decode(&self, bytes: &[u8]) -> Result<u32, ProtocolError> {
        let width = self.width.bytes();
        if bytes.len() != width {
            return Err(ProtocolError::InvalidLength {
                expected: width,
                actual: bytes.len(),
            });
        }
        let mut buf = [0u8; 4];
        buf[..width].copy_from_slice(bytes);
        Ok(u32::from_le_bytes(buf))
    }
}

/// 控制表（MX 系列 Protocol 2.0 固件）
///
/// 地址与宽度必须与设备保持一致。
pub mod map {
    use super::{Access, Register, RegisterWidth};

    pub const BAUD_RATE: Register =
        Register::new("Baud Rate", 8, RegisterWidth::One, Access::ReadWrite);
    pub const OPERATING_MODE: Register =
        Register::new("Operating Mode", 11, RegisterWidth::One, Access::ReadWrite);
    pub const VELOCITY_LIMIT: Register =
        Register::new("Velocity Limit", 44, RegisterWidth::Four, Access::ReadWrite);
    pub const TORQUE_ENABLE: Register =
        Register::new("Torque Enable", 64, RegisterWidth::One, Access::ReadWrite);
    pub const LED: Register = Register::new("LED", 65, RegisterWidth::One, Access::ReadWrite);
    pub const GOAL_PWM: Register = Register::new("Goal PWM", 100, RegisterWidth::Two, Access::Write);
    pub const GOAL_VELOCITY: Register =
        Register::new("Goal Velocity", 104, RegisterWidth::Four, Access::Write);
    pub const GOAL_POSITION: Register =
        Register::new("Goal Position", 116, RegisterWidth::Four, Access::Write);
    pub const PRESENT_LOAD: Register =
        Register::new("Present Load", 126, RegisterWidth::Two, Access::Read);
    /// 当前位置：设备控制表中为 4 字节有符号值（多圈模式下可为负）
    pub const PRESENT_POSITION: Register =
        Register::new("Present Position", 132, RegisterWidth::Four, Access::Read);
    pub const PRESENT_VOLTAGE: Register =
        Register::new("Present Input Voltage", 144, RegisterWidth::Two, Access::Read);

    /// EEPROM 区域上界：此地址以下的写入要求扭矩关闭
    pub const EEPROM_END: u16 = 64;

    /// 全部已知寄存器
    pub const ALL: &[Register] = &[
        BAUD_RATE,
        OPERATING_MODE,
        VELOCITY_LIMIT,
        TORQUE_ENABLE,
        LED,
        GOAL_PWM,
        GOAL_VELOCITY,
        GOAL_POSITION,
        PRESENT_LOAD,
        PRESENT_POSITION,
        PRESENT_VOLTAGE,
    ];
}

// ============================================================================
// 运行模式
// ============================================================================

/// 运行模式
///
/// 原始码值不连续（1/4/16），由判别值直接保存码表，
/// 不能用枚举序号代替设备码值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum OperatingMode {
    /// 速度模式
    Velocity = 1,
    /// 位置模式（扩展位置 / 多圈）
    Position = 4,
    /// PWM 模式
    Pwm = 16,
}

impl OperatingMode {
    /// 命令层使用的模式序号：0 → Position，1 → Velocity，2 → PWM
    pub const BY_INDEX: [OperatingMode; 3] = [
        OperatingMode::Position,
        OperatingMode::Velocity,
        OperatingMode::Pwm,
    ];

    /// 设备码值
    pub fn code(self) -> u8 {
        self.into()
    }

    /// 从设备码值解析
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Self::try_from(code).map_err(|_| ProtocolError::InvalidValue {
            field: "operating_mode",
            value: code as u32,
        })
    }

    /// 从命令序号解析
    pub fn from_index(index: usize) -> Result<Self, ProtocolError> {
        Self::BY_INDEX
            .get(index)
            .copied()
            .ok_or(ProtocolError::InvalidValue {
                field: "mode_index",
                value: index as u32,
            })
    }

    /// 命令序号
    pub fn index(self) -> usize {
        match self {
            OperatingMode::Position => 0,
            OperatingMode::Velocity => 1,
            OperatingMode::Pwm => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OperatingMode::Position => "POSITION",
            OperatingMode::Velocity => "VELOCITY",
            OperatingMode::Pwm => "PWM",
        }
    }
}

// ============================================================================
// 波特率
// ============================================================================

/// 支持的总线波特率（设备码值 1/2/3）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum BaudRate {
    Baud57600 = 1,
    Baud115200 = 2,
    Baud1M = 3,
}

impl BaudRate {
    /// 比特率
    pub fn bps(self) -> u32 {
        match self {
            BaudRate::Baud57600 => 57_600,
            BaudRate::Baud115200 => 115_200,
            BaudRate::Baud1M => 1_000_000,
        }
    }

    /// 从比特率解析
    pub fn from_bps(bps: u32) -> Result<Self, ProtocolError> {
        match bps {
            57_600 => Ok(BaudRate::Baud57600),
            115_200 => Ok(BaudRate::Baud115200),
            1_000_000 => Ok(BaudRate::Baud1M),
            other => Err(ProtocolError::UnsupportedBaud(other)),
        }
    }

    /// 设备码值
    pub fn code(self) -> u8 {
        self.into()
    }

    /// 从设备码值解析
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Self::try_from(code).map_err(|_| ProtocolError::InvalidValue {
            field: "baud_rate",
            value: code as u32,
        })
    }
}

// ============================================================================
// 能力集
// ============================================================================

/// 控制能力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Position,
    Velocity,
    Pwm,
}

/// 能力集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capabilities {
    pub position: bool,
    pub velocity: bool,
    pub pwm: bool,
}

impl Capabilities {
    pub const ALL: Self = Self {
        position: true,
        velocity: true,
        pwm: true,
    };

    /// 按型号号码推断能力集
    ///
    /// 未收录的型号按完整能力集处理，返回值第二项为 `false` 表示型号未知。
    pub fn for_model(model: u16) -> (Self, bool) {
        match model {
            MODEL_MX_28 | MODEL_MX_64 | MODEL_MX_106 => (Self::ALL, true),
            MODEL_XL_320 => (
                Self {
                    position: true,
                    velocity: true,
                    pwm: false,
                },
                true,
            ),
            _ => (Self::ALL, false),
        }
    }

    pub fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::Position => self.position,
            Capability::Velocity => self.velocity,
            Capability::Pwm => self.pwm,
        }
    }
}

impl Capability {
    /// 该能力对应的运行模式
    pub fn mode(self) -> OperatingMode {
        match self {
            Capability::Position => OperatingMode::Position,
            Capability::Velocity => OperatingMode::Velocity,
            Capability::Pwm => OperatingMode::Pwm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_map_addresses() {
        assert_eq!(map::TORQUE_ENABLE.address, 64);
        assert_eq!(map::LED.address, 65);
        assert_eq!(map::OPERATING_MODE.address, 11);
        assert_eq!(map::GOAL_POSITION.address, 116);
        assert_eq!(map::GOAL_POSITION.width, RegisterWidth::Four);
        assert_eq!(map::PRESENT_POSITION.address, 132);
        assert_eq!(map::GOAL_PWM.address, 100);
        assert_eq!(map::GOAL_PWM.width, RegisterWidth::Two);
        assert_eq!(map::GOAL_VELOCITY.address, 104);
        assert_eq!(map::BAUD_RATE.address, 8);
        assert_eq!(map::PRESENT_VOLTAGE.address, 144);
        assert_eq!(map::PRESENT_LOAD.address, 126);
    }

    #[test]
    fn test_encode_exact_width() {
        let bytes = map::GOAL_POSITION.encode(0x0001_0203).unwrap();
        assert_eq!(bytes.as_slice(), &[0x03, 0x02, 0x01, 0x00]);

        let bytes = map::LED.encode(1).unwrap();
        assert_eq!(bytes.as_slice(), &[0x01]);
    }

    #[test]
    fn test_encode_rejects_overflow() {
        let err = map::LED.encode(256).unwrap_err();
        assert!(matches!(err, ProtocolError::WidthMismatch { width: 1, .. }));

        let err = map::GOAL_PWM.encode(0x1_0000).unwrap_err();
        assert!(matches!(err, ProtocolError::WidthMismatch { width: 2, .. }));
    }

    #[test]
    fn test_encode_rejects_read_only() {
        let err = map::PRESENT_LOAD.encode(1).unwrap_err();
        assert!(matches!(err, ProtocolError::AccessDenied { .. }));
    }

    #[test]
    fn test_decode_unsigned_le() {
        assert_eq!(map::PRESENT_LOAD.decode(&[0xE8, 0x03]).unwrap(), 1000);
        assert_eq!(
            map::PRESENT_POSITION.decode(&[0xFF, 0xFF, 0xFF, 0xFF]).unwrap(),
            u32::MAX
        );
        assert!(map::PRESENT_LOAD.decode(&[0x01]).is_err());
    }

    #[test]
    fn test_mode_codes_are_a_table() {
        assert_eq!(OperatingMode::Position.code(), 4);
        assert_eq!(OperatingMode::Velocity.code(), 1);
        assert_eq!(OperatingMode::Pwm.code(), 16);
        assert_eq!(OperatingMode::from_code(16).unwrap(), OperatingMode::Pwm);
        assert!(OperatingMode::from_code(2).is_err());
    }

    #[test]
    fn test_mode_index_mapping() {
        for (index, mode) in OperatingMode::BY_INDEX.iter().enumerate() {
            assert_eq!(OperatingMode::from_index(index).unwrap(), *mode);
            assert_eq!(mode.index(), index);
        }
        assert!(OperatingMode::from_index(3).is_err());
    }

    #[test]
    fn test_baud_codes() {
        assert_eq!(BaudRate::from_bps(57_600).unwrap().code(), 1);
        assert_eq!(BaudRate::from_bps(115_200).unwrap().code(), 2);
        assert_eq!(BaudRate::from_bps(1_000_000).unwrap().code(), 3);
        assert_eq!(
            BaudRate::from_bps(9600).unwrap_err(),
            ProtocolError::UnsupportedBaud(9600)
        );
        assert_eq!(BaudRate::from_code(3).unwrap().bps(), 1_000_000);
        assert!(BaudRate::from_code(0).is_err());
    }

    #[test]
    fn test_capabilities_for_model() {
        let (caps, known) = Capabilities::for_model(MODEL_MX_28);
        assert!(known);
        assert!(caps.contains(Capability::Pwm));

        let (caps, known) = Capabilities::for_model(MODEL_XL_320);
        assert!(known);
        assert!(!caps.contains(Capability::Pwm));

        let (caps, known) = Capabilities::for_model(9999);
        assert!(!known);
        assert_eq!(caps, Capabilities::ALL);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_mode_serde() {
        let json = serde_json::to_string(&OperatingMode::Pwm).unwrap();
        let mode: OperatingMode = serde_json::from_str(&json).unwrap();
        assert_eq!(mode, OperatingMode::Pwm);
    }
}
