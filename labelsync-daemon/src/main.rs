use anyhow::Result;
use clap::Parser;

use labelsync_daemon::cli::DaemonCli;
use labelsync_daemon::logging;
use labelsync_daemon::orchestrator::{self, Orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 오류는 로깅 초기화 전이므로 anyhow 에러로 그대로 종료
    let config = orchestrator::load_config(&cli).await?;

    if cli.validate {
        println!("configuration is valid");
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "labelsync-daemon starting");

    Orchestrator::build_from_config(config)?.run().await
}
