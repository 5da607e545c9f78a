// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use clap::Parser;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub chain_rpc_url: String,
    pub chain_rpc_ws_url: Option<String>,
    pub confirmations: u64,
    pub batch_blocks: u64,
    pub poll_interval: Duration,
    pub far_behind_threshold: u64,
    pub bootstrap_tail_blocks: u64,
    pub force_from_block: Option<u64>,
    pub rpc_timeout: Duration,
}

#[derive(Debug, Clone, Parser)]
pub struct IndexerCLIConfig {
    /// HTTP JSON-RPC endpoint of the chain node
    #[arg(long, env)]
    chain_rpc_url: String,

    /// Optional websocket endpoint enabling the live tail
    #[arg(long, env)]
    chain_rpc_ws_url: Option<String>,

    /// Blocks to stay behind the chain head
    #[arg(long, env, default_value_t = 15)]
    indexer_confirmations: u64,

    /// Max blocks per getLogs request
    #[arg(long, env, default_value_t = 1500)]
    indexer_batch_blocks: u64,

    /// Backfill tick in milliseconds
    #[arg(long, env, default_value_t = 10000)]
    indexer_poll_interval_ms: u64,

    /// Cursor distance that triggers a fresh bootstrap
    #[arg(long, env, default_value_t = 1_000_000)]
    far_behind_threshold: u64,

    /// On bootstrap the cursor starts at target minus this many blocks
    #[arg(long, env, default_value_t = 5000)]
    bootstrap_tail_blocks: u64,

    /// One-shot reindex: rewind the cursor to this block on startup
    #[arg(long, env)]
    force_from_block: Option<u64>,

    /// Deadline for one RPC request, in milliseconds
    #[arg(long, env, default_value_t = 10000)]
    chain_rpc_timeout_ms: u64,
}

impl From<IndexerCLIConfig> for IndexerConfig {
    fn from(cli_config: IndexerCLIConfig) -> Self {
        Self {
            chain_rpc_url: cli_config.chain_rpc_url,
            chain_rpc_ws_url: cli_config.chain_rpc_ws_url,
            confirmations: cli_config.indexer_confirmations,
            batch_blocks: cli_config.indexer_batch_blocks.max(1),
            poll_interval: Duration::from_millis(
                cli_config.indexer_poll_interval_ms,
            ),
            far_behind_threshold: cli_config.far_behind_threshold,
            bootstrap_tail_blocks: cli_config.bootstrap_tail_blocks,
            force_from_block: cli_config.force_from_block,
            rpc_timeout: Duration::from_millis(
                cli_config.chain_rpc_timeout_ms,
            ),
        }
    }
}
