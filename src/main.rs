//! BankBot 入口
//!
//! 初始化日志、加载配置、按银行标识构建会话，循环执行查询直到会话中断或收到 Ctrl-C。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bankbot::config::load_config;
use bankbot::core::{SessionBuilder, WorkFlow, WorkParams, WorkResult};
use bankbot::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    // 可选参数：配置文件路径，缺省读取 config/default.toml
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let orchestrator = Arc::new(
        SessionBuilder::new(cfg)
            .build()
            .context("Failed to build session")?,
    );

    {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                orchestrator.stop();
            }
        });
    }

    if orchestrator
        .do_work(WorkFlow::Start, WorkParams::default())
        .await
        != WorkResult::Flag(true)
    {
        anyhow::bail!("Failed to start session");
    }

    let mut cycles = 0usize;
    while orchestrator.run_cycle(None, None).await {
        cycles += 1;
        tracing::info!(cycles, "cycle finished");
    }

    let state = orchestrator.break_state().await;
    tracing::info!(cycles, reason = %state.reason, "session ended");
    Ok(())
}
