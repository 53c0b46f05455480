//! 单次命令调用

use super::ConnectArgs;
use crate::config::CliConfig;
use anyhow::{Context, Result};
use clap::Args;
use hand_server::Requester;
use std::fs;
use std::path::PathBuf;

/// 发送一条命令并打印回复
#[derive(Args, Debug)]
pub struct CallCommand {
    /// 命令文本，例如 "set_motor_position(45, [1])"
    pub command: String,

    #[command(flatten)]
    pub connect: ConnectArgs,

    /// 保存回复附带的图像
    #[arg(long)]
    pub save_frame: Option<PathBuf>,
}

impl CallCommand {
    pub fn execute(self, config: &CliConfig) -> Result<()> {
        let mut client = self.connect.client(config);
        let reply = client
            .request(&self.command)
            .with_context(|| format!("请求失败: {}", client.addr()))?;

        println!("{}", reply.text);

        if let Some(path) = &self.save_frame {
            fs::write(path, &reply.payload)
                .with_context(|| format!("保存图像失败: {}", path.display()))?;
            println!("🖼  图像已保存: {} ({} bytes)", path.display(), reply.payload.len());
        }

        if reply.text.starts_with("[!]") {
            anyhow::bail!("命令执行失败");
        }
        Ok(())
    }
}
