//! 命令通道帧格式
//!
//! 每条消息 = 12 字节头 + 文本 + 负载：
//!
//! ```text
//! msg_type u8 | flags u8 | reserved u16 | text_len u32 BE | payload_len u32 BE
//! ```
//!
//! 请求（`0x01`）只携带命令文本；回复（`0x81`）携带结果文本与一帧图像。

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::io::{self, Read, Write};
use thiserror::Error;

/// 消息头长度
pub const HEADER_LEN: usize = 12;
/// 文本长度上限（64 KiB）
pub const MAX_TEXT_LEN: usize = 64 * 1024;
/// 负载长度上限（16 MiB）
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// 帧格式错误
#[derive(Debug, Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{field} too large: {len} bytes (max {max})")]
    TooLarge {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Unknown message type: 0x{0:02X}")]
    UnknownType(u8),

    #[error("Expected {expected:?} message, got {actual:?}")]
    UnexpectedType {
        expected: MessageType,
        actual: MessageType,
    },

    #[error("Request must not carry a payload ({0} bytes)")]
    UnexpectedPayload(usize),

    #[error("Message text is not valid UTF-8")]
    InvalidText,
}

impl WireError {
    /// 是否为读写超时
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            WireError::Io(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }

    /// 消息已完整读取、只是内容无效：可以回复错误并继续读取下一条
    pub fn is_malformed_body(&self) -> bool {
        matches!(
            self,
            WireError::InvalidText
                | WireError::UnexpectedPayload(_)
                | WireError::UnexpectedType { .. }
        )
    }
}

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    Request = 0x01,
    Reply = 0x81,
}

/// 消息头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: MessageType,
    pub flags: u8,
    pub text_len: u32,
    pub payload_len: u32,
}

impl Header {
    fn new(kind: MessageType, text_len: usize, payload_len: usize) -> Result<Self, WireError> {
        check_len("text", text_len, MAX_TEXT_LEN)?;
        check_len("payload", payload_len, MAX_PAYLOAD_LEN)?;
        Ok(Self {
            kind,
            flags: 0,
            text_len: text_len as u32,
            payload_len: payload_len as u32,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.kind.into();
        buf[1] = self.flags;
        // buf[2..4] 保留
        buf[4..8].copy_from_slice(&self.text_len.to_be_bytes());
        buf[8..12].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// 解析消息头并检查长度上限
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self, WireError> {
        let kind = MessageType::try_from(buf[0]).map_err(|_| WireError::UnknownType(buf[0]))?;
        let text_len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let payload_len = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        check_len("text", text_len as usize, MAX_TEXT_LEN)?;
        check_len("payload", payload_len as usize, MAX_PAYLOAD_LEN)?;
        Ok(Self {
            kind,
            flags: buf[1],
            text_len,
            payload_len,
        })
    }
}

fn check_len(field: &'static str, len: usize, max: usize) -> Result<(), WireError> {
    if len > max {
        return Err(WireError::TooLarge { field, len, max });
    }
    Ok(())
}

/// 完整消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub text: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), WireError> {
        let header = Header::new(self.kind, self.text.len(), self.payload.len())?;
        writer.write_all(&header.encode())?;
        writer.write_all(self.text.as_bytes())?;
        writer.write_all(&self.payload)?;
        writer.flush()?;
        Ok(())
    }

    /// 读取一条消息
    ///
    /// 对端在消息边界处关闭连接时返回 `Ok(None)`。
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<Self>, WireError> {
        let mut buf = [0u8; HEADER_LEN];
        let first = loop {
            match reader.read(&mut buf[..1]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if first == 0 {
            return Ok(None);
        }
        reader.read_exact(&mut buf[1..])?;
        let header = Header::decode(&buf)?;

        // 先读完整条消息再校验，出错时连接仍停在消息边界
        let mut text = vec![0u8; header.text_len as usize];
        reader.read_exact(&mut text)?;
        let mut payload = vec![0u8; header.payload_len as usize];
        reader.read_exact(&mut payload)?;
        let text = String::from_utf8(text).map_err(|_| WireError::InvalidText)?;

        Ok(Some(Self {
            kind: header.kind,
            text,
            payload,
        }))
    }
}

/// 命令请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub text: String,
}

impl Request {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), WireError> {
        Message {
            kind: MessageType::Request,
            text: self.text.clone(),
            payload: Vec::new(),
        }
        .write_to(writer)
    }

    /// 读取请求；连接正常关闭时返回 `Ok(None)`
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<Self>, WireError> {
        let Some(message) = Message::read_from(reader)? else {
            return Ok(None);
        };
        if message.kind != MessageType::Request {
            return Err(WireError::UnexpectedType {
                expected: MessageType::Request,
                actual: message.kind,
            });
        }
        if !message.payload.is_empty() {
            return Err(WireError::UnexpectedPayload(message.payload.len()));
        }
        Ok(Some(Self { text: message.text }))
    }
}

/// 命令回复：结果文本 + 图像帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub payload: Vec<u8>,
}

impl Reply {
    pub fn new(text: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            text: text.into(),
            payload,
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), WireError> {
        Message {
            kind: MessageType::Reply,
            text: self.text.clone(),
            payload: self.payload.clone(),
        }
        .write_to(writer)
    }

    /// 读取回复；连接在回复前关闭视为 I/O 错误
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        let message = Message::read_from(reader)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed before reply")
        })?;
        if message.kind != MessageType::Reply {
            return Err(WireError::UnexpectedType {
                expected: MessageType::Reply,
                actual: message.kind,
            });
        }
        Ok(Self {
            text: message.text,
            payload: message.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let header = Header::new(MessageType::Reply, 5, 0x0102_0304).unwrap();
        assert_eq!(
            header.encode(),
            [0x81, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x01, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn test_request_roundtrip() {
        let mut buf = Vec::new();
        Request::new("get_motor_position()").write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN + 20);

        let mut cursor = Cursor::new(buf);
        let request = Request::read_from(&mut cursor).unwrap().unwrap();
        assert_eq!(request.text, "get_motor_position()");
        // 消息边界处 EOF
        assert!(Request::read_from(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_reply_roundtrip() {
        let mut buf = Vec::new();
        let reply = Reply::new("[1, 3]", vec![0xFF, 0xD8, 0xFF, 0xD9]);
        reply.write_to(&mut buf).unwrap();
        assert_eq!(Reply::read_from(&mut Cursor::new(buf)).unwrap(), reply);
    }

    #[test]
    fn test_unknown_type() {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = 0x42;
        let err = Message::read_from(&mut Cursor::new(buf.to_vec())).unwrap_err();
        assert!(matches!(err, WireError::UnknownType(0x42)));
    }

    #[test]
    fn test_text_too_large() {
        let mut buf = Header {
            kind: MessageType::Request,
            flags: 0,
            text_len: 0,
            payload_len: 0,
        }
        .encode();
        buf[4..8].copy_from_slice(&((MAX_TEXT_LEN + 1) as u32).to_be_bytes());
        let err = Message::read_from(&mut Cursor::new(buf.to_vec())).unwrap_err();
        assert!(matches!(
            err,
            WireError::TooLarge { field: "text", .. }
        ));

        let oversized = "x".repeat(MAX_TEXT_LEN + 1);
        let err = Request::new(oversized).write_to(&mut Vec::new()).unwrap_err();
        assert!(matches!(err, WireError::TooLarge { .. }));
    }

    #[test]
    fn test_request_with_payload_rejected() {
        let mut buf = Vec::new();
        Message {
            kind: MessageType::Request,
            text: "none".into(),
            payload: vec![1, 2],
        }
        .write_to(&mut buf)
        .unwrap();
        let err = Request::read_from(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, WireError::UnexpectedPayload(2)));
        assert!(err.is_malformed_body());
    }

    #[test]
    fn test_invalid_text_keeps_stream_in_sync() {
        let mut buf = Header {
            kind: MessageType::Request,
            flags: 0,
            text_len: 2,
            payload_len: 3,
        }
        .encode()
        .to_vec();
        buf.extend_from_slice(&[0xFF, 0xFE, 1, 2, 3]);
        Request::new("get_load()").write_to(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf);
        let err = Request::read_from(&mut cursor).unwrap_err();
        assert!(matches!(err, WireError::InvalidText));
        assert!(err.is_malformed_body());

        let next = Request::read_from(&mut cursor).unwrap().unwrap();
        assert_eq!(next.text, "get_load()");
    }

    #[test]
    fn test_reply_in_place_of_request() {
        let mut buf = Vec::new();
        Reply::new("x", vec![]).write_to(&mut buf).unwrap();
        let err = Request::read_from(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, WireError::UnexpectedType { .. }));
    }

    #[test]
    fn test_truncated_message() {
        let mut buf = Vec::new();
        Request::new("set_led(1)").write_to(&mut buf).unwrap();
        buf.truncate(HEADER_LEN + 3);
        let err = Request::read_from(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, WireError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buf = Header::new(MessageType::Request, 2, 0).unwrap().encode().to_vec();
        buf.extend([0xC3, 0x28]);
        let err = Request::read_from(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, WireError::InvalidText));
    }
}
