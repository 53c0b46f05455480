//! 同步读取轮询组
//!
//! 一个轮询组由 `(ID 集合, 寄存器, 参数存储)` 组成，一次总线交换读取全部成员。
//!
//! - 成员变化时必须整体 [`PollGroup::rebuild`]，不保留旧集合的登记
//! - [`PollGroup::read`] 最多进行 [`RETRY_BUDGET`] 轮；一轮中任一成员数据不可用，
//!   整轮重试，绝不返回部分成员的结果

use crate::bus::Bus;
use crate::transaction::RETRY_BUDGET;
use hand_bus::{BusAdapter, BusError};
use hand_protocol::{BROADCAST_ID, ProtocolError, Register, StatusPacket};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// 单轮失败原因
#[derive(Debug)]
pub enum RoundFailure {
    /// 总线交换失败
    Comm(BusError),
    /// 某成员无可用数据（未回复、设备错误或长度不符）
    Unavailable(u8),
}

impl fmt::Display for RoundFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundFailure::Comm(e) => write!(f, "communication error: {}", e),
            RoundFailure::Unavailable(id) => write!(f, "data unavailable for id {}", id),
        }
    }
}

/// 同步读取错误
#[derive(Error, Debug)]
pub enum SyncReadError {
    #[error("Poll group has no members")]
    Empty,

    #[error("Invalid poll group member id {0}")]
    InvalidId(u8),

    #[error("Duplicate poll group member id {0}")]
    DuplicateId(u8),

    #[error("Sync read failed after {rounds} round(s): {last}")]
    Exhausted { rounds: usize, last: RoundFailure },

    /// 总线已关闭等致命错误，不再重试
    #[error("Transport error during sync read: {0}")]
    Transport(BusError),
}

impl SyncReadError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncReadError::Transport(_))
    }
}

/// 同步读取轮询组
#[derive(Debug, Clone)]
pub struct PollGroup {
    register: Register,
    ids: Vec<u8>,
    data: BTreeMap<u8, StatusPacket>,
}

impl PollGroup {
    /// 创建空轮询组（寄存器必须可读）
    pub fn new(register: &Register) -> Result<Self, ProtocolError> {
        if !register.access.is_readable() {
            return Err(ProtocolError::AccessDenied {
                register: register.name,
                access: "readable",
            });
        }
        Ok(Self {
            register: *register,
            ids: Vec::new(),
            data: BTreeMap::new(),
        })
    }

    pub fn register(&self) -> &Register {
        &self.register
    }

    /// 当前成员（登记顺序）
    pub fn ids(&self) -> &[u8] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// 登记一个成员
    pub fn add_param(&mut self, id: u8) -> Result<(), SyncReadError> {
        if id >= BROADCAST_ID {
            return Err(SyncReadError::InvalidId(id));
        }
        if self.ids.contains(&id) {
            return Err(SyncReadError::DuplicateId(id));
        }
        self.ids.push(id);
        Ok(())
    }

    /// 清空全部登记与缓存数据
    pub fn clear_param(&mut self) {
        self.ids.clear();
        self.data.clear();
    }

    /// 以新的成员集合整体重建
    ///
    /// 失败时轮询组保持为空，不会残留部分登记。
    pub fn rebuild(&mut self, ids: &[u8]) -> Result<(), SyncReadError> {
        self.clear_param();
        for &id in ids {
            if let Err(e) = self.add_param(id) {
                self.clear_param();
                return Err(e);
            }
        }
        info!(
            "Poll group for {} rebuilt with ids {:?}",
            self.register.name, self.ids
        );
        Ok(())
    }

    /// 执行一次同步读取交换，缓存到达的回复
    pub fn txrx<A: BusAdapter>(&mut self, bus: &mut Bus<A>) -> Result<(), BusError> {
        self.data.clear();
        let replies = bus.sync_read(
            self.register.address,
            self.register.width.bytes() as u16,
            &self.ids,
        )?;
        for status in replies {
            if self.ids.contains(&status.id) {
                self.data.insert(status.id, status);
            } else {
                debug!("Ignoring sync read reply from non-member id {}", status.id);
            }
        }
        Ok(())
    }

    /// 成员数据是否可用：已回复、无设备错误、长度与寄存器宽度一致
    pub fn is_available(&self, id: u8) -> bool {
        self.data.get(&id).is_some_and(|status| {
            status.is_ok() && status.params.len() == self.register.width.bytes()
        })
    }

    /// 成员的原始值（无符号小端）
    pub fn data(&self, id: u8) -> Option<u32> {
        if !self.is_available(id) {
            return None;
        }
        self.data
            .get(&id)
            .and_then(|status| self.register.decode(&status.params).ok())
    }

    /// 带重试的同步读取
    ///
    /// 成功时按登记顺序返回全部成员的 `(id, 原始值)`。
    pub fn read<A: BusAdapter>(
        &mut self,
        bus: &mut Bus<A>,
    ) -> Result<Vec<(u8, u32)>, SyncReadError> {
        if self.ids.is_empty() {
            return Err(SyncReadError::Empty);
        }

        let mut last = None;
        for round in 1..=RETRY_BUDGET {
            let failure = match self.txrx(bus) {
                Err(e) if e.is_fatal() => return Err(SyncReadError::Transport(e)),
                Err(e) => RoundFailure::Comm(e),
                Ok(()) => match self.ids.iter().find(|&&id| !self.is_available(id)) {
                    Some(&id) => RoundFailure::Unavailable(id),
                    None => {
                        return Ok(self
                            .ids
                            .iter()
                            .filter_map(|&id| self.data(id).map(|value| (id, value)))
                            .collect());
                    },
                },
            };
            debug!(
                "Sync read round {}/{} failed: {}",
                round, RETRY_BUDGET, failure
            );
            last = Some(failure);
        }

        let err = SyncReadError::Exhausted {
            rounds: RETRY_BUDGET,
            last: last.unwrap_or(RoundFailure::Comm(BusError::Timeout)),
        };
        warn!("{}", err);
        Err(err)
    }
}
