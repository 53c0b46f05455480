//! # Hand Server
//!
//! 命令分发服务与监控客户端
//!
//! ## 模块
//!
//! - `wire`: 请求/回复帧格式（12 字节头 + 文本 + 图像负载）
//! - `command`: 字面量命令解析与白名单
//! - `dispatch`: 命令执行、回复文本格式、`Idle`/`Processing` 状态
//! - `server`: TCP 服务循环（单客户端、严格一问一答、可中断）
//! - `frame`: 图像帧来源
//! - `client`: TCP 客户端（超时后重连）
//! - `supervisor`: 轮询刷新与命令队列
//!
//! ## 示例
//!
//! ```no_run
//! use hand_client::FleetBuilder;
//! use hand_server::{Dispatcher, Server, StaticFrame};
//!
//! let fleet = FleetBuilder::new().motors(5).build().unwrap();
//! let dispatcher = Dispatcher::new(fleet, StaticFrame::placeholder());
//! let server = Server::bind("0.0.0.0:5555", dispatcher).unwrap();
//! let report = server.serve().unwrap();
//! println!("{:?}", report);
//! ```

pub mod client;
pub mod command;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod server;
pub mod supervisor;
pub mod wire;

pub use client::{DEFAULT_TIMEOUT, HandClient, Requester};
pub use command::{COMMANDS, Command, CommandError};
pub use dispatch::{Dispatcher, ServerState};
pub use error::ServerError;
pub use frame::{FileFrame, FrameError, FrameSource, PLACEHOLDER_JPEG, StaticFrame};
pub use server::{DEFAULT_BIND, Server, ServerConfig};
pub use supervisor::{
    COMMAND_QUEUE_CAPACITY, CommandQueue, DEFAULT_TICK, MotorView, RefreshCycle, RefreshOp,
    StepOutcome, Supervisor,
};
pub use wire::{MessageType, Reply, Request, WireError};
