//! 客户端接口模块
//!
//! 本模块提供舵机手的用户友好接口，包括：
//! - 强类型单位（`Degrees`、`Rpm`、`PwmPercent`、`LoadPercent`、`Volts`）
//! - 单舵机接口（[`Actuator`]，借用 `Fleet` 的总线，不持有独立句柄）
//! - 舵机组控制器（[`Fleet`]，发现、批量操作、同步读取、收尾）
//!
//! # 使用场景
//!
//! 这是大多数用户应该使用的模块。
//! 如果需要直接读写寄存器，可以使用 `hand-driver`。

pub mod actuator;
pub mod builder;
pub mod fleet;
pub mod types;

// 重新导出常用类型
pub use actuator::Actuator;
pub use builder::{DEFAULT_DISCOVERY_ATTEMPTS, FleetBuilder, FleetConfig, ModeSwitchPolicy};
pub use fleet::{BatchResult, Fleet, Readings, TeardownReport};
pub use types::*;

pub use hand_protocol::{BaudRate, OperatingMode};
