//! 基础类型系统
//!
//! 提供强类型单位、遥测缓存和错误类型。

pub mod error;
pub mod telemetry;
pub mod units;

pub use error::*;
pub use telemetry::*;
pub use units::*;
