//! 总线所有权
//!
//! [`Bus`] 独占底层适配器。半双工总线上同时存在两个发送方会破坏帧结构，
//! 所以所有交换都要求 `&mut self`，上层只能借用、不能复制句柄。

use crate::builder::BusConfig;
use hand_bus::{BusAdapter, BusError};
use hand_protocol::{BROADCAST_ID, InstructionPacket, ProtocolError, StatusPacket};
use std::time::Instant;
use tracing::{debug, info, warn};

/// 等待目标回复时最多丢弃的无关状态包数量
const MAX_STRAY_REPLIES: usize = 16;

/// 独占的舵机总线
pub struct Bus<A: BusAdapter> {
    adapter: A,
    config: BusConfig,
}

impl<A: BusAdapter> Bus<A> {
    pub fn new(adapter: A, config: BusConfig) -> Self {
        Self { adapter, config }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn is_open(&self) -> bool {
        self.adapter.is_open()
    }

    pub fn baud_rate(&self) -> u32 {
        self.adapter.baud_rate()
    }

    /// 单播交换：发送指令并等待目标 ID 的状态包
    ///
    /// 其他 ID 的状态包（上一轮的迟到回复）被丢弃。
    pub fn exchange(&mut self, packet: &InstructionPacket) -> Result<StatusPacket, BusError> {
        self.adapter.clear()?;
        self.adapter.send(packet)?;

        for _ in 0..MAX_STRAY_REPLIES {
            let status = self.adapter.receive_timeout(self.config.receive_timeout)?;
            if status.id == packet.id {
                return Ok(status);
            }
            debug!(
                "Discarding stray status from id {} while waiting for id {}",
                status.id, packet.id
            );
        }
        Err(BusError::Protocol(ProtocolError::Framing(format!(
            "no reply from id {} among stray packets",
            packet.id
        ))))
    }

    /// 发送不需要回复的指令（广播写入等）
    pub fn send_only(&mut self, packet: &InstructionPacket) -> Result<(), BusError> {
        self.adapter.clear()?;
        self.adapter.send(packet)
    }

    /// 广播 Ping，收集时间窗口内的全部回复
    ///
    /// 返回的状态包按到达顺序排列。
    /// 损坏的回复被丢弃（记录日志），只有致命错误才会返回 `Err`。
    pub fn ping_broadcast(&mut self) -> Result<Vec<StatusPacket>, BusError> {
        self.adapter.clear()?;
        self.adapter.send(&InstructionPacket::ping(BROADCAST_ID))?;
        self.collect(usize::MAX)
    }

    /// 同步读取：一次交换读取多个设备的同一寄存器
    ///
    /// 返回到达的全部状态包（可能少于 `ids.len()`，由调用方判断可用性）。
    pub fn sync_read(
        &mut self,
        address: u16,
        length: u16,
        ids: &[u8],
    ) -> Result<Vec<StatusPacket>, BusError> {
        self.adapter.clear()?;
        self.adapter
            .send(&InstructionPacket::sync_read(address, length, ids))?;
        let replies = self.collect(ids.len())?;
        if replies.is_empty() && !ids.is_empty() {
            return Err(BusError::Timeout);
        }
        Ok(replies)
    }

    fn collect(&mut self, limit: usize) -> Result<Vec<StatusPacket>, BusError> {
        let deadline = Instant::now() + self.config.broadcast_window;
        let mut replies = Vec::new();

        while replies.len() < limit {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.adapter.receive_timeout(remaining) {
                Ok(status) => replies.push(status),
                Err(BusError::Timeout) => break,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Dropping corrupt reply during broadcast: {}", e),
            }
        }
        Ok(replies)
    }

    /// 以新波特率重新打开总线
    pub fn reopen(&mut self, baud: u32) -> Result<(), BusError> {
        self.adapter.set_baud_rate(baud)?;
        info!("Bus reopened at {} bps", baud);
        Ok(())
    }

    /// 关闭总线（幂等）
    pub fn close(&mut self) {
        if self.adapter.is_open() {
            self.adapter.close();
            info!("Bus closed");
        }
    }
}
