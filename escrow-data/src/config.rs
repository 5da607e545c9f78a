// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use clap::Parser;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub db_path: String,
    pub connection_pool_size: u32,
    pub backoff: ExponentialBackoff,
}

#[derive(Debug, Clone, Parser)]
pub struct RepositoryCLIConfig {
    /// Path of the SQLite database file
    #[arg(long, env, default_value = "clawed-escrow.sqlite3")]
    escrow_db_path: String,

    /// Size of the store connection pool
    #[arg(long, env, default_value_t = 3)]
    escrow_db_pool_size: u32,

    #[arg(long, env, default_value = "120000")]
    escrow_db_backoff_max_elapsed_duration: u64,
}

impl From<RepositoryCLIConfig> for RepositoryConfig {
    fn from(cli_config: RepositoryCLIConfig) -> RepositoryConfig {
        let backoff_max_elapsed_duration = Duration::from_millis(
            cli_config.escrow_db_backoff_max_elapsed_duration,
        );
        let backoff = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(backoff_max_elapsed_duration))
            .build();
        RepositoryConfig {
            db_path: cli_config.escrow_db_path,
            connection_pool_size: cli_config.escrow_db_pool_size,
            backoff,
        }
    }
}
