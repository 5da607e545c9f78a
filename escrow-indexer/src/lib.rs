// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod chain;
mod config;
mod engine;
mod error;
mod status;
mod tail;

pub use chain::{ChainSource, ChainSourceError, EthersChain};
pub use config::{IndexerCLIConfig, IndexerConfig};
pub use engine::{Engine, EngineOptions, Step};
pub use error::IndexerError;
pub use status::{new_status_handle, IndexerStatus, StatusHandle, StepSummary};
pub use tail::run_tail;

use std::time::Duration;

/// Backfill polling loop. Errors are captured into the shared status and the
/// loop keeps ticking; it only returns if the task is aborted.
#[tracing::instrument(level = "trace", skip_all)]
pub async fn run<C: ChainSource + 'static>(
    mut engine: Engine<C>,
    poll_interval: Duration,
) -> Result<(), IndexerError> {
    loop {
        match engine.advance_once().await {
            Ok(Step::Idle { head, target, .. }) => {
                tracing::trace!(head, target, "indexer is idle at target");
            }
            Ok(Step::Progress {
                from,
                to,
                processed,
                undecodable,
                ..
            }) => {
                tracing::debug!(
                    from,
                    to,
                    processed,
                    undecodable,
                    "indexer advanced one batch"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "indexer step failed; will retry");
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}
