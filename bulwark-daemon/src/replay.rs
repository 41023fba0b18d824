//! Line replay -- feeds raw log lines through the stage pipeline.
//!
//! Each non-empty input line becomes a log [`Event`]. Events that walk
//! through every stage (`process == true`) are written to the output as
//! one JSON object per line; everything else is counted and dropped.
//!
//! ```text
//! input --lines--> Event::from_line --> StagePipeline::process --> JSON line --> output
//!                                               |
//!                                        dropped / failed
//! ```

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use bulwark_core::event::Event;
use bulwark_parser::StagePipeline;

/// Counters for one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Non-empty lines read from the input.
    pub read: u64,
    /// Events that completed the last stage.
    pub processed: u64,
    /// Events that stopped before the last stage.
    pub dropped: u64,
    /// Events aborted by a pipeline error.
    pub failed: u64,
}

/// Replay every line of `input` through `pipeline`.
///
/// Stops at end of input or when `token` is cancelled. Per-event pipeline
/// errors are logged and counted, never fatal.
///
/// # Errors
///
/// Returns an error if reading the input or writing the output fails.
pub async fn replay<R, W>(
    pipeline: &StagePipeline,
    input: R,
    mut output: W,
    token: &CancellationToken,
) -> Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut stats = ReplayStats::default();

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("replay cancelled");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            tracing::debug!("end of input");
            break;
        };

        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        stats.read += 1;

        match pipeline.process(Event::from_line(line)) {
            Ok(event) if event.process => {
                stats.processed += 1;
                let mut json = serde_json::to_vec(&event)?;
                json.push(b'\n');
                output.write_all(&json).await?;
            }
            Ok(event) => {
                stats.dropped += 1;
                tracing::trace!(stage = %event.stage, "event dropped");
            }
            Err(e) => {
                stats.failed += 1;
                tracing::warn!(error = %e, "failed to process line");
            }
        }
    }

    output.flush().await?;
    Ok(stats)
}
