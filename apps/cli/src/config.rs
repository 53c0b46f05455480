//! CLI 配置文件
//!
//! 位置：`<config_dir>/hand/config.toml`，可用 `--config` 覆盖。
//! 命令行参数优先于配置文件。

use anyhow::{Context, Result};
use hand_protocol::BaudRate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 默认配置文件路径
pub fn default_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("hand");
    path.push("config.toml");
    Ok(path)
}

/// `[serial]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSection {
    /// 串口路径
    pub port: Option<String>,
    /// 波特率（bps）
    pub baud: Option<u32>,
    /// 期望舵机数量
    pub motors: Option<usize>,
}

/// `[server]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// 服务监听地址
    pub bind: Option<String>,
    /// 客户端连接地址
    pub connect: Option<String>,
    /// 客户端收发超时（毫秒）
    pub timeout_ms: Option<u64>,
}

/// `[frame]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSection {
    /// 外部采集进程写入的图像文件
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub serial: SerialSection,
    pub server: ServerSection,
    pub frame: FrameSection,
}

/// 可通过 `config get` 查询的键
pub const KEYS: &[&str] = &[
    "serial.port",
    "serial.baud",
    "serial.motors",
    "server.bind",
    "server.connect",
    "server.timeout_ms",
    "frame.file",
];

impl CliConfig {
    /// 加载配置；文件不存在时返回默认配置
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    /// 保存配置（自动创建目录）
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("创建配置目录失败")?;
        }
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, content).with_context(|| format!("写入配置文件失败: {}", path.display()))
    }

    /// 按键取值（未设置为 `None`）
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = match key {
            "serial.port" => self.serial.port.clone(),
            "serial.baud" => self.serial.baud.map(|v| v.to_string()),
            "serial.motors" => self.serial.motors.map(|v| v.to_string()),
            "server.bind" => self.server.bind.clone(),
            "server.connect" => self.server.connect.clone(),
            "server.timeout_ms" => self.server.timeout_ms.map(|v| v.to_string()),
            "frame.file" => self.frame.file.as_ref().map(|p| p.display().to_string()),
            _ => anyhow::bail!("未知配置项: {}（可用: {}）", key, KEYS.join(", ")),
        };
        Ok(value)
    }

    /// 检查配置取值，返回发现的问题
    pub fn check(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if let Some(baud) = self.serial.baud
            && BaudRate::from_bps(baud).is_err()
        {
            problems.push(format!(
                "serial.baud = {} 不受支持（57600, 115200, 1000000）",
                baud
            ));
        }
        if self.serial.motors == Some(0) {
            problems.push("serial.motors 必须至少为 1".to_string());
        }
        if self.server.timeout_ms == Some(0) {
            problems.push("server.timeout_ms 必须大于 0".to_string());
        }
        if let Some(file) = &self.frame.file
            && !file.exists()
        {
            problems.push(format!("frame.file 不存在: {}", file.display()));
        }
        problems
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.server.timeout_ms.map(Duration::from_millis)
    }
}
