// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use std::time::Duration;

use escrow_events::{decimal, hex_address};

use crate::error::ApiError;
use crate::server::ApiContext;

const VIEW_CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn healthz() -> HttpResponse {
    HttpResponse::Ok().body("")
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepResponse {
    from: u64,
    to: u64,
    processed: u64,
    finished_at: chrono::NaiveDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexerStatusResponse {
    head: Option<u64>,
    cursor: Option<u64>,
    last: Option<StepResponse>,
    error: Option<String>,
    undecodable: u64,
}

pub async fn indexer_status(
    req: HttpRequest,
    ctx: web::Data<ApiContext>,
) -> Result<HttpResponse, ApiError> {
    ctx.limiter.check(&req)?;
    let status = ctx.status.read().await;
    Ok(HttpResponse::Ok().json(IndexerStatusResponse {
        head: status.head,
        cursor: status.cursor,
        last: status.last_step.as_ref().map(|step| StepResponse {
            from: step.from,
            to: step.to,
            processed: step.processed,
            finished_at: step.finished_at,
        }),
        error: status.last_error.clone(),
        undecodable: status.undecodable_total,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EscrowViewResponse {
    usdc: String,
    treasury: String,
    arbiter: String,
    deposit_fee_amount: String,
    recipient_fee_amount: String,
}

/// Live contract view values. The only endpoint that talks to the chain on
/// the request path, hence its own deadline.
pub async fn escrow_view(
    req: HttpRequest,
    ctx: web::Data<ApiContext>,
) -> Result<HttpResponse, ApiError> {
    ctx.limiter.check(&req)?;
    let contract =
        ctx.escrow_view.as_ref().ok_or(ApiError::ChainUnavailable {
            message: "escrow view client is not configured".to_owned(),
        })?;

    let response = tokio::time::timeout(VIEW_CALL_TIMEOUT, async {
        let usdc = contract.usdc().call().await?;
        let treasury = contract.treasury().call().await?;
        let arbiter = contract.arbiter().call().await?;
        let deposit_fee = contract.deposit_fee_amount().call().await?;
        let recipient_fee = contract.recipient_fee_amount().call().await?;
        Ok::<_, ethers::contract::ContractError<_>>(EscrowViewResponse {
            usdc: hex_address(&usdc),
            treasury: hex_address(&treasury),
            arbiter: hex_address(&arbiter),
            deposit_fee_amount: decimal(&deposit_fee),
            recipient_fee_amount: decimal(&recipient_fee),
        })
    })
    .await
    .map_err(|_| ApiError::ChainUnavailable {
        message: "escrow view call timed out".to_owned(),
    })?
    .map_err(|e| {
        tracing::warn!(error = %e, "escrow view call failed");
        ApiError::ChainUnavailable {
            message: "escrow view call failed".to_owned(),
        }
    })?;

    Ok(HttpResponse::Ok().json(response))
}
