//! 指令包 / 状态包编解码
//!
//! ```text
//! 指令包: FF FF FD 00 | ID | LEN_L LEN_H | INST | PARAM... | CRC_L CRC_H
//! 状态包: FF FF FD 00 | ID | LEN_L LEN_H | 0x55 | ERR | PARAM... | CRC_L CRC_H
//! ```
//!
//! - LEN = 填充后的（指令 + 参数）字节数 + 2（CRC）
//! - 字节填充：包体中每出现一次 `FF FF FD`，其后插入一个 `FD`
//! - CRC-16：多项式 0x8005，初值 0，MSB first，对填充后的整包（不含 CRC）计算

use crate::ProtocolError;
use crate::constants::{
    BROADCAST_ID, CRC_LEN, HEADER, Instruction, MAX_PACKET_LEN, PREFIX_LEN, STUFFING_BYTE,
};
use crate::status::StatusError;
use smallvec::SmallVec;

/// 参数缓冲区（绝大多数包的参数不超过 16 字节，避免堆分配）
pub type Params = SmallVec<[u8; 16]>;

// ============================================================================
// CRC-16
// ============================================================================

const CRC_POLY: u16 = 0x8005;

const CRC_TABLE: [u16; 256] = build_crc_table();

const fn build_crc_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// 计算 CRC-16
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &byte| {
        let index = ((crc >> 8) as u8 ^ byte) as usize;
        (crc << 8) ^ CRC_TABLE[index]
    })
}

// ============================================================================
// 字节填充
// ============================================================================

fn stuff(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + body.len() / 3);
    for &byte in body {
        out.push(byte);
        let n = out.len();
        if n >= 3 && out[n - 3..] == [0xFF, 0xFF, 0xFD] {
            out.push(STUFFING_BYTE);
        }
    }
    out
}

fn unstuff(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        out.push(body[i]);
        let n = out.len();
        if n >= 3
            && out[n - 3..] == [0xFF, 0xFF, 0xFD]
            && body.get(i + 1) == Some(&STUFFING_BYTE)
        {
            i += 1; // 跳过填充字节
        }
        i += 1;
    }
    out
}

fn encode_frame(id: u8, body: &[u8]) -> Vec<u8> {
    let stuffed = stuff(body);
    let length = (stuffed.len() + CRC_LEN) as u16;

    let mut packet = Vec::with_capacity(PREFIX_LEN + stuffed.len() + CRC_LEN);
    packet.extend_from_slice(&HEADER);
    packet.push(id);
    packet.extend_from_slice(&length.to_le_bytes());
    packet.extend_from_slice(&stuffed);
    let crc = crc16(&packet);
    packet.extend_from_slice(&crc.to_le_bytes());
    packet
}

// ============================================================================
// 原始帧
// ============================================================================

/// 已校验、已去填充的原始帧
///
/// `body` 为指令字节及其后的全部参数（状态包中包含 0x55 与错误字节）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub id: u8,
    pub body: Vec<u8>,
}

impl RawFrame {
    /// 从完整字节包解析（必须恰好是一个包）
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut decoder = PacketDecoder::new();
        decoder.push(bytes);
        let frame = decoder
            .next_frame()?
            .ok_or_else(|| ProtocolError::Framing("incomplete packet".to_string()))?;
        if decoder.buffered() != 0 {
            return Err(ProtocolError::Framing(format!(
                "{} trailing bytes",
                decoder.buffered()
            )));
        }
        Ok(frame)
    }
}

// ============================================================================
// 指令包
// ============================================================================

/// 指令包（主机 → 设备）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionPacket {
    pub id: u8,
    pub instruction: Instruction,
    pub params: Params,
}

impl InstructionPacket {
    pub fn new(id: u8, instruction: Instruction, params: &[u8]) -> Self {
        Self {
            id,
            instruction,
            params: SmallVec::from_slice(params),
        }
    }

    /// Ping（`id` 为广播 ID 时所有设备都会回复）
    pub fn ping(id: u8) -> Self {
        Self::new(id, Instruction::Ping, &[])
    }

    /// 读取 `length` 字节
    pub fn read(id: u8, address: u16, length: u16) -> Self {
        let mut params = Params::new();
        params.extend_from_slice(&address.to_le_bytes());
        params.extend_from_slice(&length.to_le_bytes());
        Self {
            id,
            instruction: Instruction::Read,
            params,
        }
    }

    /// 写入数据
    pub fn write(id: u8, address: u16, data: &[u8]) -> Self {
        let mut params = Params::new();
        params.extend_from_slice(&address.to_le_bytes());
        params.extend_from_slice(data);
        Self {
            id,
            instruction: Instruction::Write,
            params,
        }
    }

    /// 同步读取：一次总线交换读取多个设备的同一寄存器
    pub fn sync_read(address: u16, length: u16, ids: &[u8]) -> Self {
        let mut params = Params::new();
        params.extend_from_slice(&address.to_le_bytes());
        params.extend_from_slice(&length.to_le_bytes());
        params.extend_from_slice(ids);
        Self {
            id: BROADCAST_ID,
            instruction: Instruction::SyncRead,
            params,
        }
    }

    /// 预期回复的状态包数量上限
    ///
    /// - 单播：1 个
    /// - 广播 Ping：未知（返回 `None`）
    /// - 同步读取：每个列出的 ID 一个
    /// - 其他广播：0 个
    pub fn expected_replies(&self) -> Option<usize> {
        if self.id != BROADCAST_ID {
            return Some(1);
        }
        match self.instruction {
            Instruction::Ping => None,
            Instruction::SyncRead => Some(self.params.len().saturating_sub(4)),
            _ => Some(0),
        }
    }

    /// 编码为总线字节
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(1 + self.params.len());
        body.push(self.instruction.into());
        body.extend_from_slice(&self.params);
        encode_frame(self.id, &body)
    }

    /// 读取/同步读取指令中的 (地址, 长度)
    pub fn read_span(&self) -> Option<(u16, u16)> {
        match self.instruction {
            Instruction::Read | Instruction::SyncRead if self.params.len() >= 4 => Some((
                u16::from_le_bytes([self.params[0], self.params[1]]),
                u16::from_le_bytes([self.params[2], self.params[3]]),
            )),
            _ => None,
        }
    }
}

impl TryFrom<RawFrame> for InstructionPacket {
    type Error = ProtocolError;

    fn try_from(frame: RawFrame) -> Result<Self, Self::Error> {
        let (&inst, params) = frame
            .body
            .split_first()
            .ok_or(ProtocolError::InvalidLength {
                expected: 1,
                actual: 0,
            })?;
        let instruction = Instruction::try_from(inst)
            .map_err(|_| ProtocolError::InvalidInstruction { value: inst })?;
        if instruction == Instruction::Status {
            return Err(ProtocolError::InvalidInstruction { value: inst });
        }
        Ok(Self::new(frame.id, instruction, params))
    }
}

// ============================================================================
// 状态包
// ============================================================================

/// 状态包（设备 → 主机）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPacket {
    pub id: u8,
    /// 原始错误字节，解析见 [`StatusPacket::status_error`]
    pub error: u8,
    pub params: Params,
}

impl StatusPacket {
    pub fn new(id: u8, error: u8, params: &[u8]) -> Self {
        Self {
            id,
            error,
            params: SmallVec::from_slice(params),
        }
    }

    /// 错误字节位域
    pub fn status_error(&self) -> StatusError {
        StatusError::from(self.error)
    }

    /// 设备未报告错误
    pub fn is_ok(&self) -> bool {
        self.error == 0
    }

    /// Ping 回复中的 (型号, 固件版本)
    pub fn ping_info(&self) -> Result<(u16, u8), ProtocolError> {
        if self.params.len() < 3 {
            return Err(ProtocolError::InvalidLength {
                expected: 3,
                actual: self.params.len(),
            });
        }
        Ok((
            u16::from_le_bytes([self.params[0], self.params[1]]),
            self.params[2],
        ))
    }

    /// 编码为总线字节
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(2 + self.params.len());
        body.push(Instruction::Status.into());
        body.push(self.error);
        body.extend_from_slice(&self.params);
        encode_frame(self.id, &body)
    }
}

impl TryFrom<RawFrame> for StatusPacket {
    type Error = ProtocolError;

    fn try_from(frame: RawFrame) -> Result<Self, Self::Error> {
        if frame.body.len() < 2 {
            return Err(ProtocolError::InvalidLength {
                expected: 2,
                actual: frame.body.len(),
            });
        }
        if frame.body[0] != u8::from(Instruction::Status) {
            return Err(ProtocolError::InvalidInstruction {
                value: frame.body[0],
            });
        }
        Ok(Self::new(frame.id, frame.body[1], &frame.body[2..]))
    }
}

// ============================================================================
// 流式解码器
// ============================================================================

/// 流式解码器
///
/// 串口读取到的字节可能被任意切分，也可能夹杂噪声。
/// 解码器在包头上重新同步，丢弃无法识别的前缀。
#[derive(Debug, Default)]
pub struct PacketDecoder {
    buf: Vec<u8>,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加收到的字节
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// 缓冲区中尚未消费的字节数
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// 丢弃全部缓冲
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// 尝试取出下一个完整帧
    ///
    /// # 返回
    /// - `Ok(Some(frame))`: 完整且 CRC 正确的帧（已从缓冲区移除）
    /// - `Ok(None)`: 数据不足，需要继续读取
    /// - `Err(_)`: 帧损坏（已从缓冲区移除，可以继续调用）
    pub fn next_frame(&mut self) -> Result<Option<RawFrame>, ProtocolError> {
        // 对齐到包头
        match self.buf.windows(HEADER.len()).position(|w| w == HEADER) {
            Some(0) => {},
            Some(start) => {
                self.buf.drain(..start);
            },
            None => {
                // 保留可能是包头前缀的尾部字节
                let keep = self.buf.len().min(HEADER.len() - 1);
                let cut = self.buf.len() - keep;
                self.buf.drain(..cut);
                return Ok(None);
            },
        }

        if self.buf.len() < PREFIX_LEN {
            return Ok(None);
        }

        let id = self.buf[4];
        let length = u16::from_le_bytes([self.buf[5], self.buf[6]]) as usize;
        if !(CRC_LEN + 1..=MAX_PACKET_LEN).contains(&length) {
            // 丢弃包头第一个字节以便重新同步
            self.buf.drain(..1);
            return Err(ProtocolError::Framing(format!(
                "invalid length field {length}"
            )));
        }

        let total = PREFIX_LEN + length;
        if self.buf.len() < total {
            return Ok(None);
        }

        let packet: Vec<u8> = self.buf.drain(..total).collect();
        let expected = crc16(&packet[..total - CRC_LEN]);
        let actual = u16::from_le_bytes([packet[total - 2], packet[total - 1]]);
        if expected != actual {
            return Err(ProtocolError::Checksum { expected, actual });
        }

        Ok(Some(RawFrame {
            id,
            body: unstuff(&packet[PREFIX_LEN..total - CRC_LEN]),
        }))
    }

    /// 取出下一个状态包
    pub fn next_status(&mut self) -> Result<Option<StatusPacket>, ProtocolError> {
        self.next_frame()?.map(StatusPacket::try_from).transpose()
    }
}
