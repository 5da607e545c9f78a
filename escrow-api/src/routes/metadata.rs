// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Authenticated writes layering off-chain text on top of on-chain
//! commitments. Every write cross-checks the projection: the wallet must
//! hold the on-chain role and the submitted hash must match the on-chain
//! one, otherwise nothing is stored.

use actix_web::{web, HttpRequest, HttpResponse};
use ethers::utils::keccak256;
use serde::Deserialize;

use escrow_data::{NewProofRow, TaskMetadataRow};

use super::{blocking, parse_task_id};
use crate::auth::{authenticate, require_wallet};
use crate::error::ApiError;
use crate::server::ApiContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveMetadataRequest {
    title: String,
    instructions: String,
    spec_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveProofRequest {
    proof_text: String,
    proof_hash: String,
    tx_hash: Option<String>,
}

pub async fn save_task_metadata(
    req: HttpRequest,
    ctx: web::Data<ApiContext>,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    ctx.limiter.check(&req)?;
    let wallet = require_wallet(
        authenticate(&ctx.repository, &ctx.auth, &req, &body).await?,
    )?;
    let task_id = parse_task_id(&path)?;

    let request: SaveMetadataRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::validation(format!("invalid body: {}", e)))?;
    if request.title.trim().is_empty() {
        return Err(ApiError::validation("title must not be empty"));
    }
    let spec_hash = normalize_hash(&request.spec_hash)?;

    let repository = ctx.repository.clone();
    let lookup_id = task_id.clone();
    let task = blocking(move || repository.task(&lookup_id))
        .await?
        .ok_or_else(|| ApiError::not_found("unknown task"))?;

    if task.requester.as_deref() != Some(wallet.as_str()) {
        return Err(ApiError::forbidden(
            "not_requester",
            "only the task requester may attach metadata",
        ));
    }
    if let Some(onchain) = &task.spec_hash {
        if *onchain != spec_hash {
            return Err(ApiError::conflict(
                "spec_hash_mismatch",
                "specHash does not match the on-chain commitment",
            ));
        }
    }

    let row = TaskMetadataRow {
        chain_id: 0,         // scoped by the repository on write
        contract_address: String::new(),
        task_id: task_id.clone(),
        spec_hash,
        title: request.title,
        instructions: request.instructions,
        created_by: wallet,
        updated_at: chrono::Utc::now().naive_utc(),
    };
    let repository = ctx.repository.clone();
    let stored = row.clone();
    blocking(move || repository.upsert_task_metadata(stored)).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "taskId": row.task_id,
        "specHash": row.spec_hash,
        "title": row.title,
        "instructions": row.instructions,
        "createdBy": row.created_by,
        "updatedAt": row.updated_at,
    })))
}

pub async fn save_proof(
    req: HttpRequest,
    ctx: web::Data<ApiContext>,
    path: web::Path<(String, i64)>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    ctx.limiter.check(&req)?;
    let wallet = require_wallet(
        authenticate(&ctx.repository, &ctx.auth, &req, &body).await?,
    )?;
    let (raw_task_id, submission_id) = path.into_inner();
    let task_id = parse_task_id(&raw_task_id)?;
    if submission_id < 0 {
        return Err(ApiError::validation(
            "submission id must be non-negative",
        ));
    }

    let request: SaveProofRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::validation(format!("invalid body: {}", e)))?;
    let proof_hash = normalize_hash(&request.proof_hash)?;

    let repository = ctx.repository.clone();
    let lookup_id = task_id.clone();
    let submission = blocking(move || {
        repository.submission(&lookup_id, submission_id)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("unknown submission"))?;

    if submission.agent.as_deref() != Some(wallet.as_str()) {
        return Err(ApiError::forbidden(
            "not_agent",
            "only the submission agent may attach proof text",
        ));
    }

    // The stored text must commit to the submitted hash, and the hash to
    // the on-chain one.
    let computed =
        format!("0x{}", hex::encode(keccak256(request.proof_text.as_bytes())));
    if computed != proof_hash {
        return Err(ApiError::conflict(
            "proof_hash_mismatch",
            "proofText does not hash to proofHash",
        ));
    }
    if let Some(onchain) = &submission.proof_hash {
        if *onchain != proof_hash {
            return Err(ApiError::conflict(
                "proof_hash_mismatch",
                "proofHash does not match the on-chain commitment",
            ));
        }
    }

    let row = NewProofRow {
        chain_id: 0,         // scoped by the repository on write
        contract_address: String::new(),
        task_id: task_id.clone(),
        submission_id,
        wallet,
        proof_text: request.proof_text,
        proof_hash,
        tx_hash: request.tx_hash,
        created_at: chrono::Utc::now().naive_utc(),
    };
    let repository = ctx.repository.clone();
    blocking(move || repository.insert_proof(row)).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "taskId": task_id,
        "submissionId": submission_id,
        "saved": true,
    })))
}

fn normalize_hash(raw: &str) -> Result<String, ApiError> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    if stripped.len() != 64
        || !stripped.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(ApiError::validation(
            "hash must be a 32-byte hex string",
        ));
    }
    Ok(format!("0x{}", stripped.to_ascii_lowercase()))
}
