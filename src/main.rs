//! ragent - 检索增强的会话 Agent
//!
//! 入口：初始化日志、加载配置、构建编排器，然后在终端里逐行读取问题并流式输出回答。
//! 用法：`ragent [config.toml]`；输入 exit / quit 退出，Ctrl+C 取消当前回答。

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use ragent::{core::AgentBuilder, load_config, ui::StdoutSink};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

fn prompt() {
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(b"\n> ");
    let _ = out.flush();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ragent::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load configuration")?;
    let mut orchestrator = AgentBuilder::new(config)
        .build()
        .await
        .context("Failed to build agent")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else { break };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") || query.eq_ignore_ascii_case("quit") {
            break;
        }

        let cancel = CancellationToken::new();
        let mut sink = StdoutSink::new();
        let result = {
            let turn = orchestrator.run_turn(query, &mut sink, cancel.clone());
            tokio::pin!(turn);
            loop {
                tokio::select! {
                    r = &mut turn => break r,
                    _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                        tracing::info!("cancelling current turn");
                        cancel.cancel();
                    }
                }
            }
        };

        match result {
            Ok(outcome) => tracing::debug!(turn_id = %outcome.turn_id, "turn done"),
            Err(e) if e.is_fatal() => return Err(e).context("Turn failed"),
            Err(e) => eprintln!("\n[error] {e}"),
        }
    }
    Ok(())
}
