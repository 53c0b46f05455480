//! 命令客户端
//!
//! `request(&mut self, ..)` 的独占借用保证同一时刻最多一个未完成请求。
//! 超时或 I/O 错误后丢弃连接，下一次请求时重新建立。

use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::frame::FrameSource;
use crate::wire::{Reply, Request};
use hand_bus::BusAdapter;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 默认收发超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// 一问一答的请求方
pub trait Requester {
    fn request(&mut self, text: &str) -> Result<Reply, ServerError>;
}

/// 进程内直接分发（无网络）
impl<A: BusAdapter, F: FrameSource> Requester for Dispatcher<A, F> {
    fn request(&mut self, text: &str) -> Result<Reply, ServerError> {
        Ok(self.handle(text))
    }
}

impl<R: Requester + ?Sized> Requester for &mut R {
    fn request(&mut self, text: &str) -> Result<Reply, ServerError> {
        (**self).request(text)
    }
}

/// TCP 客户端
#[derive(Debug)]
pub struct HandClient {
    addr: String,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl HandClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_TIMEOUT,
            stream: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// 主动断开（下一次请求会重新连接）
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("Disconnected from {}", self.addr);
        }
    }

    fn open(&self) -> Result<TcpStream, ServerError> {
        let mut last = None;
        for addr in self.addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout))?;
                    stream.set_write_timeout(Some(self.timeout))?;
                    stream.set_nodelay(true)?;
                    info!("Connected to server {}", addr);
                    return Ok(stream);
                },
                Err(e) => last = Some(e),
            }
        }
        Err(last
            .unwrap_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no address resolved for {}", self.addr),
                )
            })
            .into())
    }
}

impl Requester for HandClient {
    fn request(&mut self, text: &str) -> Result<Reply, ServerError> {
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => self.open()?,
        };

        let result = Request::new(text)
            .write_to(&mut stream)
            .and_then(|()| Reply::read_from(&mut stream));

        match result {
            Ok(reply) => {
                self.stream = Some(stream);
                Ok(reply)
            },
            Err(e) => {
                // 连接状态未知，丢弃后重连
                warn!("Request {:?} failed, dropping connection: {}", text, e);
                Err(e.into())
            },
        }
    }
}
