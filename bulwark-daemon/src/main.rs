mod cli;

use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;

use bulwark_core::config::BulwarkConfig;
use bulwark_daemon::logging;
use bulwark_daemon::orchestrator::{Orchestrator, validate_config};

use crate::cli::DaemonCli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 파일 -> 환경변수 -> CLI 순으로 적용
    let mut config = BulwarkConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
    config.apply_env_overrides();
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    if let Some(path) = cli.dump {
        config.parser.dump = true;
        config.parser.dump_path = path;
    }

    if cli.validate {
        validate_config(&config)?;
        println!("configuration is valid: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(config = %cli.config.display(), "bulwark-daemon starting");

    let orchestrator = Orchestrator::build_from_config(config).await?;

    let stats = match cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| anyhow::anyhow!("failed to open input {}: {}", path.display(), e))?;
            orchestrator
                .run(BufReader::new(file), tokio::io::stdout())
                .await?
        }
        None => {
            orchestrator
                .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
                .await?
        }
    };

    tracing::info!(processed = stats.processed, "bulwark-daemon shut down");
    Ok(())
}
