// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum Error {
    #[snafu(display("database pool connection error"))]
    DatabaseConnectionError {
        source: backoff::Error<diesel::r2d2::PoolError>,
    },

    #[snafu(display("database error"))]
    DatabaseError { source: diesel::result::Error },

    #[snafu(display("store migration error"))]
    MigrationError {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[snafu(display("{} not found", item_type))]
    ItemNotFound { item_type: String },

    #[snafu(display("submission id {} exceeds the storable range", value))]
    SubmissionIdOverflow { value: u64 },
}
