//! Daemon orchestration -- assembly and lifecycle management.
//!
//! The [`Orchestrator`] loads configuration, builds the stage pipeline
//! from the node directory, validates the sync settings, and drives a
//! replay run until the input ends or a shutdown signal arrives.
//!
//! # Lifecycle
//!
//! 1. Load `bulwark.toml` and apply environment variable overrides
//! 2. Install the metrics recorder (if enabled)
//! 3. Load parser nodes and build the pipeline
//! 4. Replay input until EOF, SIGTERM, or SIGINT
//! 5. Write the stage dump (if enabled)

use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use bulwark_core::config::BulwarkConfig;
use bulwark_papi::PapiConfig;
use bulwark_parser::{ParserConfig, StagePipeline, StagePipelineBuilder};

use crate::metrics_server;
use crate::replay::{ReplayStats, replay};

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: BulwarkConfig,
    /// Assembled stage pipeline.
    pipeline: StagePipeline,
    /// Sync settings, present when `[papi] enabled = true`.
    sync: Option<PapiConfig>,
    /// Cancelled on shutdown signal.
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or parsed
    /// - Configuration validation fails
    /// - Parser nodes fail to load or compile
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = BulwarkConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: BulwarkConfig) -> Result<Self> {
        let sync = validate_config(&config)?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let started = Instant::now();
        let pipeline = StagePipelineBuilder::new()
            .config(ParserConfig::from_core(&config.parser))
            .load_nodes()
            .await
            .map_err(|e| anyhow::anyhow!("failed to load parser nodes: {}", e))?
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build stage pipeline: {}", e))?;

        tracing::info!(
            stages = ?pipeline.stages(),
            nodes = pipeline.nodes().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage pipeline initialized"
        );

        if let Some(sync) = &sync {
            tracing::info!(
                subscription = %sync.subscription,
                interval_secs = sync.sync_interval_secs,
                shares_deletions = sync.shares_deletions(),
                "sync settings loaded"
            );
        }

        Ok(Self {
            config,
            pipeline,
            sync,
            shutdown: CancellationToken::new(),
        })
    }

    /// Replay `input` through the pipeline, writing processed events to `output`.
    ///
    /// Blocks until the input ends or a shutdown signal (SIGTERM, SIGINT)
    /// is received. The stage dump is written afterwards when enabled.
    pub async fn run<R, W>(&self, input: R, output: W) -> Result<ReplayStats>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let token = self.shutdown.clone();
        let signal_task = tokio::spawn(async move {
            tokio::select! {
                signal = wait_for_shutdown_signal() => match signal {
                    Ok(signal) => {
                        tracing::info!(signal, "shutdown signal received");
                        token.cancel();
                    }
                    Err(e) => tracing::error!(error = %e, "signal handler unavailable"),
                },
                _ = token.cancelled() => {}
            }
        });

        tracing::info!("replaying input");
        let result = replay(&self.pipeline, input, output, &self.shutdown).await;
        self.shutdown.cancel();
        let _ = signal_task.await;

        let stats = result?;
        tracing::info!(
            read = stats.read,
            processed = stats.processed,
            dropped = stats.dropped,
            failed = stats.failed,
            "replay finished"
        );

        if self.config.parser.dump {
            self.pipeline
                .write_dump()
                .await
                .map_err(|e| anyhow::anyhow!("failed to write stage dump: {}", e))?;
            tracing::info!(path = %self.config.parser.dump_path, "stage dump written");
        }

        Ok(stats)
    }

    /// Token cancelled on shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The assembled stage pipeline.
    pub fn pipeline(&self) -> &StagePipeline {
        &self.pipeline
    }

    /// Sync settings, if the sync client is enabled.
    pub fn sync_config(&self) -> Option<&PapiConfig> {
        self.sync.as_ref()
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &BulwarkConfig {
        &self.config
    }
}

/// Validate every section without starting anything.
///
/// Returns the sync settings when `[papi]` is enabled.
///
/// # Errors
///
/// Returns the first invalid field found.
pub fn validate_config(config: &BulwarkConfig) -> Result<Option<PapiConfig>> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    ParserConfig::from_core(&config.parser)
        .validate()
        .map_err(|e| anyhow::anyhow!("parser config invalid: {}", e))?;

    if !config.papi.enabled {
        return Ok(None);
    }
    let sync = PapiConfig::from_core(&config.papi, &config.console)
        .map_err(|e| anyhow::anyhow!("papi config invalid: {}", e))?;
    sync.validate()
        .map_err(|e| anyhow::anyhow!("papi config invalid: {}", e))?;
    Ok(Some(sync))
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}
