//! 驱动层模块
//!
//! 本模块提供舵机总线的设备驱动功能，包括：
//! - 总线独占所有权（[`Bus`]，一次只有一个交换在进行中）
//! - 单寄存器事务与有界重试（[`Executor`]，重试预算 5 次，失败分类）
//! - 同步读取轮询组（[`PollGroup`]，整轮重试，不返回部分结果）
//! - 广播发现（[`discover`]）
//!
//! # 使用场景
//!
//! 适用于需要直接读写寄存器的场景。
//! 大多数用户应该使用 `hand-client` 提供的 `Fleet` 接口。

mod builder;
mod bus;
pub mod discovery;
mod error;
pub mod poll_group;
pub mod transaction;

pub use builder::{BusBuilder, BusConfig, DEFAULT_BAUD, DEFAULT_PORT};
pub use bus::Bus;
pub use discovery::{DiscoveredDevice, discover};
pub use error::DriverError;
pub use poll_group::{PollGroup, RoundFailure, SyncReadError};
pub use transaction::{
    DeviceFault, Executor, FailureKind, Operation, RETRY_BUDGET, Transaction, TransactionFailure,
};

// 重新导出下层类型，方便上层只依赖本 crate
pub use hand_bus::{BusAdapter, BusError};
