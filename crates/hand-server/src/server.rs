//! TCP 命令服务
//!
//! 一次只服务一个客户端，连接内严格一问一答：
//! 上一个回复发出之前不会读取下一个请求。
//! 其他客户端在监听队列中等待，直到当前客户端断开。

use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::frame::FrameSource;
use crate::wire::Request;
use hand_bus::BusAdapter;
use hand_client::TeardownReport;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 默认监听地址
pub const DEFAULT_BIND: &str = "0.0.0.0:5555";

/// 服务配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// 检查关闭标志的间隔
    pub poll_interval: Duration,
    /// 读取请求体、发送回复的超时
    pub io_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            io_timeout: Duration::from_millis(5000),
        }
    }
}

/// 命令服务
pub struct Server<A: BusAdapter, F: FrameSource> {
    listener: TcpListener,
    dispatcher: Dispatcher<A, F>,
    config: ServerConfig,
    shutdown: Arc<AtomicBool>,
}

impl<A: BusAdapter, F: FrameSource> Server<A, F> {
    pub fn bind(addr: impl ToSocketAddrs, dispatcher: Dispatcher<A, F>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        info!("Server ready on {}, waiting for client", listener.local_addr()?);
        Ok(Self {
            listener,
            dispatcher,
            config: ServerConfig::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// 使用外部关闭标志（例如 Ctrl-C 处理器持有的标志）
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// 关闭标志：置位后服务在当前请求结束后退出
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn dispatcher(&self) -> &Dispatcher<A, F> {
        &self.dispatcher
    }

    /// 运行直到关闭标志置位或出现致命错误
    ///
    /// 任何退出路径都会执行 `Fleet` 收尾（关闭扭矩、关闭总线）。
    pub fn serve(self) -> Result<TeardownReport, ServerError> {
        let Server {
            listener,
            mut dispatcher,
            config,
            shutdown,
        } = self;

        let outcome = loop {
            if shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested");
                break Ok(());
            }
            match listener.accept() {
                Ok((stream, peer)) => {
                    info!("Client connected: {}", peer);
                    match serve_client(&mut dispatcher, stream, &config, &shutdown) {
                        Ok(()) => info!("Client disconnected: {}", peer),
                        Err(e) => warn!("Client {} dropped: {}", peer, e),
                    }
                    if let Some(reason) = dispatcher.fatal() {
                        error!("Stopping server: {}", reason);
                        break Err(ServerError::Fatal(reason.to_string()));
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(config.poll_interval);
                },
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    thread::sleep(config.poll_interval);
                },
            }
        };

        let report = dispatcher.into_fleet().shutdown();
        outcome.map(|()| report)
    }
}

/// 服务单个连接，直到对端断开、关闭标志置位或出现致命错误
/// 无法解析的请求在错误回复中的显示文本
const MALFORMED_REQUEST: &str = "<malformed request>";

fn serve_client<A: BusAdapter, F: FrameSource>(
    dispatcher: &mut Dispatcher<A, F>,
    mut stream: TcpStream,
    config: &ServerConfig,
    shutdown: &AtomicBool,
) -> Result<(), ServerError> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(config.io_timeout))?;

    loop {
        if !wait_readable(&stream, config.poll_interval, shutdown)? {
            return Ok(());
        }
        stream.set_read_timeout(Some(config.io_timeout))?;
        let reply = match Request::read_from(&mut stream) {
            Ok(Some(request)) => dispatcher.handle(&request.text),
            Ok(None) => return Ok(()),
            // 消息已完整读出，连接仍可继续使用
            Err(e) if e.is_malformed_body() => dispatcher.reject(MALFORMED_REQUEST, &e),
            Err(e) => return Err(e.into()),
        };
        debug!("Reply: {}", reply.text);
        reply.write_to(&mut stream)?;

        if dispatcher.fatal().is_some() {
            return Ok(());
        }
    }
}

/// 等待请求到达；关闭标志置位或对端关闭时返回 `false`
fn wait_readable(
    stream: &TcpStream,
    poll_interval: Duration,
    shutdown: &AtomicBool,
) -> Result<bool, ServerError> {
    stream.set_read_timeout(Some(poll_interval))?;
    let mut byte = [0u8; 1];
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(false);
        }
        match stream.peek(&mut byte) {
            Ok(0) => return Ok(false),
            Ok(_) => return Ok(true),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            },
            Err(e) => return Err(e.into()),
        }
    }
}
