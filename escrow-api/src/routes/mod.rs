// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod metadata;
mod system;
mod tasks;

use actix_web::web;
use ethers::types::U256;

use crate::error::ApiError;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/healthz").route(web::get().to(system::healthz)),
    )
    .service(
        web::resource("/indexer/status")
            .route(web::get().to(system::indexer_status)),
    )
    .service(
        web::resource("/escrow").route(web::get().to(system::escrow_view)),
    )
    .service(web::resource("/tasks").route(web::get().to(tasks::list_tasks)))
    .service(
        web::resource("/tasks/{id}").route(web::get().to(tasks::get_task)),
    )
    .service(
        web::resource("/tasks/{id}/submissions")
            .route(web::get().to(tasks::list_submissions)),
    )
    .service(
        web::resource("/tasks/{id}/events")
            .route(web::get().to(tasks::list_events)),
    )
    .service(
        web::resource("/tasks/{id}/check-funding")
            .route(web::post().to(tasks::check_funding)),
    )
    .service(
        web::resource("/wallets/{address}/tasks")
            .route(web::get().to(tasks::wallet_tasks)),
    )
    .service(
        web::resource("/tasks/{id}/metadata")
            .route(web::post().to(metadata::save_task_metadata)),
    )
    .service(
        web::resource("/tasks/{id}/submissions/{sid}/proof")
            .route(web::post().to(metadata::save_proof)),
    );
}

/// The store is blocking; handlers hop to the blocking pool for every query.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, escrow_data::Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|_| ApiError::internal("blocking task failed"))?
        .map_err(ApiError::from)
}

/// Task ids travel as decimal strings; normalize through U256 so `007`
/// and `7` address the same row.
pub(crate) fn parse_task_id(raw: &str) -> Result<String, ApiError> {
    let id = U256::from_dec_str(raw).map_err(|_| {
        ApiError::validation("task id must be a decimal unsigned integer")
    })?;
    Ok(id.to_string())
}
