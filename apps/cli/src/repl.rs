//! REPL 模式（交互式 Shell）
//!
//! 每行输入作为命令文本发送到服务，打印回复。
//! 连接断开或超时后下一条命令自动重连。

use anyhow::Result;
use hand_server::command::table;
use hand_server::{COMMANDS, HandClient, Requester};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

const HISTORY_FILE: &str = ".hand_history";

/// 运行 REPL 模式
pub fn run_repl(mut client: HandClient) -> Result<()> {
    let mut rl =
        DefaultEditor::new().map_err(|e| anyhow::anyhow!("Failed to initialize readline: {}", e))?;
    // 首次运行没有历史文件
    rl.load_history(HISTORY_FILE).ok();

    println!("Hand CLI v{} - 交互式 Shell", env!("CARGO_PKG_VERSION"));
    println!("服务: {}", client.addr());
    println!("输入 'help' 查看帮助，'exit' 退出");
    println!();

    loop {
        let line = match rl.readline("hand> ") {
            Ok(line) => line.trim().to_string(),
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            },
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            },
        };

        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line.as_str());

        match line.as_str() {
            "exit" | "quit" => break,
            "help" => print_help(None),
            "status" => println!(
                "📊 {}: {}",
                client.addr(),
                if client.is_connected() { "已连接" } else { "未连接" }
            ),
            _ => {
                if let Some(name) = line.strip_prefix("help ") {
                    print_help(Some(name.trim()));
                    continue;
                }
                match client.request(&line) {
                    Ok(reply) => println!("{}", reply.text),
                    Err(e) => eprintln!("❌ Error: {}", e),
                }
            },
        }
    }

    rl.save_history(HISTORY_FILE).ok();
    println!("👋 再见！");
    Ok(())
}

/// 打印帮助信息
fn print_help(name: Option<&str>) {
    if let Some(name) = name {
        match table::lookup(name) {
            Some(spec) => println!("  {:40} {}", spec.usage(), spec.summary),
            None => eprintln!("💡 未知命令: {}", name),
        }
        return;
    }

    println!("可用命令:");
    for spec in COMMANDS {
        println!("  {:40} {}", spec.usage(), spec.summary);
    }
    println!();
    println!("  none / 空行                               保活（返回 [#]: None）");
    println!("  status                                   显示连接状态");
    println!("  help [name]                              显示帮助");
    println!("  exit / quit                              退出");
    println!();
    println!("参数只接受字面量：整数、小数、True/False、None、整数列表 [1, 2]");
    println!();
}
