// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod config;
mod error;
mod projection;
mod repository;
mod schema;
mod types;

pub use config::{RepositoryCLIConfig, RepositoryConfig};
pub use error::Error;
pub use projection::AppliedEvent;
pub use repository::Repository;
pub use types::{
    CursorRow, EventRow, NewProofRow, NonceRow, ProofRow, SubmissionRow,
    SubmissionStatus, TaskMetadataRow, TaskRow, TaskStatus,
};
