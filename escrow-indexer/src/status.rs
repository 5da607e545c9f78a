// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;
use tokio::sync::RwLock;

/// Snapshot shared between the indexer loops and the HTTP status endpoint.
#[derive(Debug, Clone, Default)]
pub struct IndexerStatus {
    pub head: Option<u64>,
    pub cursor: Option<u64>,
    pub last_step: Option<StepSummary>,
    pub last_error: Option<String>,
    pub undecodable_total: u64,
}

#[derive(Debug, Clone)]
pub struct StepSummary {
    pub from: u64,
    pub to: u64,
    pub processed: u64,
    pub finished_at: chrono::NaiveDateTime,
}

pub type StatusHandle = Arc<RwLock<IndexerStatus>>;

pub fn new_status_handle() -> StatusHandle {
    Arc::new(RwLock::new(IndexerStatus::default()))
}
