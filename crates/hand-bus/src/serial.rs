//! 串口后端
//!
//! 基于 `serialport` crate。读取按截止时间循环：串口一次 `read` 可能只返回
//! 半个包，字节先进入 [`PacketDecoder`]，凑齐完整包后才返回。

use crate::{BusAdapter, BusError, DEFAULT_RECEIVE_TIMEOUT};
use hand_protocol::{BaudRate, InstructionPacket, PacketDecoder, StatusPacket};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 串口总线
pub struct SerialBus {
    path: String,
    baud: u32,
    port: Option<Box<dyn SerialPort>>,
    decoder: PacketDecoder,
    timeout: Duration,
}

impl SerialBus {
    /// 打开串口
    ///
    /// # 错误
    /// - `BusError::UnsupportedBaud`: 波特率不在 {57600, 115200, 1000000} 中
    /// - `BusError::Open`: 设备不存在、无权限或被占用
    pub fn open(path: &str, baud: u32) -> Result<Self, BusError> {
        let port = open_port(path, baud)?;
        debug!("Serial port {} opened at {} bps", path, baud);
        Ok(Self {
            path: path.to_string(),
            baud,
            port: Some(port),
            decoder: PacketDecoder::new(),
            timeout: DEFAULT_RECEIVE_TIMEOUT,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, BusError> {
        self.port.as_mut().ok_or(BusError::Closed)
    }
}

fn open_port(path: &str, baud: u32) -> Result<Box<dyn SerialPort>, BusError> {
    BaudRate::from_bps(baud).map_err(|_| BusError::UnsupportedBaud(baud))?;
    serialport::new(path, baud)
        .timeout(DEFAULT_RECEIVE_TIMEOUT)
        .open()
        .map_err(|e| BusError::Open {
            port: path.to_string(),
            reason: e.to_string(),
        })
}

impl BusAdapter for SerialBus {
    fn send(&mut self, packet: &InstructionPacket) -> Result<(), BusError> {
        let bytes = packet.encode();
        trace!("TX {}", hex::encode(&bytes));
        let port = self.port()?;
        port.write_all(&bytes)?;
        port.flush()?;
        Ok(())
    }

    fn receive(&mut self) -> Result<StatusPacket, BusError> {
        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; 256];

        loop {
            if let Some(status) = self.decoder.next_status()? {
                return Ok(status);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BusError::Timeout);
            }

            let port = self.port()?;
            port.set_timeout(remaining).map_err(io::Error::from)?;
            match port.read(&mut buf) {
                Ok(0) => continue,
                Ok(n) => {
                    trace!("RX {}", hex::encode(&buf[..n]));
                    self.decoder.push(&buf[..n]);
                },
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Err(BusError::Timeout),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(BusError::Io(e)),
            }
        }
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn clear(&mut self) -> Result<(), BusError> {
        self.decoder.clear();
        self.port()?
            .clear(ClearBuffer::Input)
            .map_err(io::Error::from)?;
        Ok(())
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), BusError> {
        // 先关闭再打开：部分 USB 转串口芯片不支持在线修改波特率
        self.close();
        let port = open_port(&self.path, baud)?;
        self.port = Some(port);
        self.baud = baud;
        debug!("Serial port {} reopened at {} bps", self.path, baud);
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush() {
                warn!("Failed to flush {} on close: {}", self.path, e);
            }
            self.decoder.clear();
            debug!("Serial port {} closed", self.path);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialBus {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_rejects_unsupported_baud() {
        let err = SerialBus::open("/dev/null", 9600).err().unwrap();
        assert!(matches!(err, BusError::UnsupportedBaud(9600)));
    }

    #[test]
    fn test_open_missing_device() {
        let err = SerialBus::open("/dev/hand-bus-does-not-exist", 57_600)
            .err()
            .unwrap();
        assert!(matches!(err, BusError::Open { .. }));
        assert!(err.is_fatal());
    }
}
