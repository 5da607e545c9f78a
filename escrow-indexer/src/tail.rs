// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use ethers::providers::{Middleware, Provider, Ws};
use snafu::ResultExt;
use std::time::Duration;
use tokio_stream::StreamExt;

use escrow_data::{AppliedEvent, Repository};
use escrow_events::{decode_log, log_filter, EscrowDeployment};

use crate::error::{
    IndexerError, JoinSnafu, RepositorySnafu, SubscribeSnafu, WsConnectSnafu,
};
use crate::status::StatusHandle;

/// Live tail: push delivery of new logs over websocket. Unordered with
/// respect to the backfill; both funnel through the same idempotent
/// `apply_event`, so double delivery is harmless.
#[tracing::instrument(level = "trace", skip_all)]
pub async fn run_tail(
    ws_url: String,
    deployment: EscrowDeployment,
    repository: Repository,
    status: StatusHandle,
    retry_interval: Duration,
) -> Result<(), IndexerError> {
    loop {
        if let Err(e) =
            tail_once(&ws_url, &deployment, &repository, &status).await
        {
            tracing::warn!(error = %e, "live tail dropped; reconnecting");
            status.write().await.last_error = Some(e.to_string());
        }
        tokio::time::sleep(retry_interval).await;
    }
}

async fn tail_once(
    ws_url: &str,
    deployment: &EscrowDeployment,
    repository: &Repository,
    status: &StatusHandle,
) -> Result<(), IndexerError> {
    let provider = Provider::<Ws>::connect(ws_url)
        .await
        .context(WsConnectSnafu)?;
    let filter = log_filter(deployment.contract_address);
    let mut stream = provider
        .subscribe_logs(&filter)
        .await
        .context(SubscribeSnafu)?;
    tracing::info!("live tail subscribed to contract logs");

    while let Some(log) = stream.next().await {
        match decode_log(deployment.contract_address, &log) {
            Ok(decoded) => {
                let event_name = decoded.event_name;
                let repository = repository.clone();
                let applied = tokio::task::spawn_blocking(move || {
                    repository.apply_event(&decoded)
                })
                .await
                .context(JoinSnafu)?
                .context(RepositorySnafu)?;
                if applied == AppliedEvent::Applied {
                    tracing::debug!(event = event_name, "tail applied event");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable tail log");
                status.write().await.undecodable_total += 1;
            }
        }
    }

    // Subscription ended without error; reconnect on the next turn.
    Ok(())
}
