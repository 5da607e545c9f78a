// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use snafu::ResultExt;

use escrow_data::{AppliedEvent, Repository};
use escrow_events::{decode_log, DecodedLog, EscrowDeployment};

use crate::chain::ChainSource;
use crate::config::IndexerConfig;
use crate::error::{
    ChainSnafu, IndexerError, JoinSnafu, RepositorySnafu,
};
use crate::status::{StatusHandle, StepSummary};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub confirmations: u64,
    pub batch_blocks: u64,
    pub far_behind_threshold: u64,
    pub bootstrap_tail_blocks: u64,
    pub force_from_block: Option<u64>,
}

impl From<&IndexerConfig> for EngineOptions {
    fn from(config: &IndexerConfig) -> Self {
        Self {
            confirmations: config.confirmations,
            batch_blocks: config.batch_blocks,
            far_behind_threshold: config.far_behind_threshold,
            bootstrap_tail_blocks: config.bootstrap_tail_blocks,
            force_from_block: config.force_from_block,
        }
    }
}

/// Outcome of one `advance_once` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The cursor already sits at `head - confirmations`.
    Idle {
        head: u64,
        target: u64,
        cursor: u64,
    },
    Progress {
        head: u64,
        target: u64,
        from: u64,
        to: u64,
        processed: u64,
        undecodable: u64,
    },
}

/// Cursor-driven batch synchronizer. One instance owns the cursor of its
/// `(chain, contract)` scope; the live tail only ever appends through the
/// same idempotent `apply_event` path, so the two need no coordination.
pub struct Engine<C: ChainSource> {
    chain: C,
    repository: Repository,
    deployment: EscrowDeployment,
    options: EngineOptions,
    force_from_block: Option<u64>,
    status: StatusHandle,
}

impl<C: ChainSource> Engine<C> {
    pub fn new(
        chain: C,
        repository: Repository,
        deployment: EscrowDeployment,
        options: EngineOptions,
        status: StatusHandle,
    ) -> Self {
        let force_from_block = options.force_from_block;
        Self {
            chain,
            repository,
            deployment,
            options,
            force_from_block,
            status,
        }
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// One batch step: read head, settle the cursor, fetch one bounded log
    /// range and apply it in chain order. Any error leaves the cursor at the
    /// last fully applied position.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn advance_once(&mut self) -> Result<Step, IndexerError> {
        let result = self.step().await;
        self.record(&result).await;
        result
    }

    async fn step(&mut self) -> Result<Step, IndexerError> {
        let head = self.chain.block_number().await.context(ChainSnafu)?;
        let target = head.saturating_sub(self.options.confirmations);

        let mut last = self
            .with_repo(|r| r.cursor())
            .await?
            .map(|c| c.max(0) as u64)
            .unwrap_or(0);

        // A fresh deploy or a wiped cursor must not scan from genesis.
        if last == 0
            || target.saturating_sub(last) > self.options.far_behind_threshold
        {
            let bootstrap =
                target.saturating_sub(self.options.bootstrap_tail_blocks);
            tracing::info!(
                cursor = last,
                bootstrap,
                "cursor is far behind; bootstrapping near the head"
            );
            self.with_repo(move |r| r.set_cursor(bootstrap as i64))
                .await?;
            last = bootstrap;
        }

        if let Some(force) = self.force_from_block.take() {
            let rewound = last.min(force.saturating_sub(1));
            if rewound < last {
                tracing::info!(
                    from = last,
                    to = rewound,
                    "one-shot reindex rewound the cursor"
                );
                self.with_repo(move |r| r.set_cursor(rewound as i64))
                    .await?;
                last = rewound;
            }
        }

        let from = last + 1;
        if from > target {
            return Ok(Step::Idle {
                head,
                target,
                cursor: last,
            });
        }
        let to = target.min(from + self.options.batch_blocks - 1);

        let logs = self.chain.logs(from, to).await.context(ChainSnafu)?;

        let mut processed = 0u64;
        let mut undecodable = 0u64;
        for log in &logs {
            match decode_log(self.deployment.contract_address, log) {
                Ok(decoded) => {
                    let block = decoded.provenance.block_number;
                    if let Err(e) = self.apply(decoded).await {
                        // Park the cursor before the failing log; records
                        // already applied from this block dedup on retry.
                        let parked = block.saturating_sub(1).max(last);
                        self.with_repo(move |r| r.set_cursor(parked as i64))
                            .await?;
                        return Err(e);
                    }
                    processed += 1;
                }
                Err(e) => {
                    undecodable += 1;
                    tracing::warn!(error = %e, "skipping undecodable log");
                }
            }
        }

        self.with_repo(move |r| r.set_cursor(to as i64)).await?;
        Ok(Step::Progress {
            head,
            target,
            from,
            to,
            processed,
            undecodable,
        })
    }

    async fn apply(
        &self,
        decoded: DecodedLog,
    ) -> Result<AppliedEvent, IndexerError> {
        let repository = self.repository.clone();
        tokio::task::spawn_blocking(move || repository.apply_event(&decoded))
            .await
            .context(JoinSnafu)?
            .context(RepositorySnafu)
    }

    /// The store is blocking; keep it off the async workers.
    async fn with_repo<T, F>(&self, f: F) -> Result<T, IndexerError>
    where
        F: FnOnce(&Repository) -> Result<T, escrow_data::Error>
            + Send
            + 'static,
        T: Send + 'static,
    {
        let repository = self.repository.clone();
        tokio::task::spawn_blocking(move || f(&repository))
            .await
            .context(JoinSnafu)?
            .context(RepositorySnafu)
    }

    async fn record(&self, result: &Result<Step, IndexerError>) {
        let mut status = self.status.write().await;
        match result {
            Ok(Step::Idle { head, cursor, .. }) => {
                status.head = Some(*head);
                status.cursor = Some(*cursor);
                status.last_error = None;
            }
            Ok(Step::Progress {
                head,
                from,
                to,
                processed,
                undecodable,
                ..
            }) => {
                status.head = Some(*head);
                status.cursor = Some(*to);
                status.last_error = None;
                status.undecodable_total += undecodable;
                status.last_step = Some(StepSummary {
                    from: *from,
                    to: *to,
                    processed: *processed,
                    finished_at: chrono::Utc::now().naive_utc(),
                });
            }
            Err(e) => {
                status.last_error = Some(e.to_string());
            }
        }
    }
}
