// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use actix_web::{web, HttpRequest, HttpResponse};
use ethers::types::Address;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;

use escrow_data::{ProofRow, SubmissionRow, TaskMetadataRow, TaskRow, TaskStatus};
use escrow_events::hex_address;

use super::{blocking, parse_task_id};
use crate::auth::authenticate;
use crate::error::ApiError;
use crate::server::ApiContext;

pub const TASK_LIST_LIMIT: i64 = 200;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadataResponse {
    pub spec_hash: String,
    pub title: String,
    pub instructions: String,
    pub created_by: String,
    pub updated_at: chrono::NaiveDateTime,
}

impl From<TaskMetadataRow> for TaskMetadataResponse {
    fn from(row: TaskMetadataRow) -> Self {
        Self {
            spec_hash: row.spec_hash,
            title: row.title,
            instructions: row.instructions,
            created_by: row.created_by,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub task_id: String,
    pub requester: Option<String>,
    pub spec_hash: Option<String>,
    pub payout_amount: Option<String>,
    pub max_winners: Option<i32>,
    pub deposit_fee_amount: Option<String>,
    pub recipient_fee_amount: Option<String>,
    pub balance: Option<String>,
    pub deadline: Option<i64>,
    pub review_window: Option<i64>,
    pub escalation_window: Option<i64>,
    pub approved_count: i32,
    pub withdrawn_count: i32,
    pub pending_submissions: i32,
    pub submission_count: i64,
    pub claim_count: i64,
    pub status: i32,
    pub created_block: i64,
    pub created_tx: String,
    pub updated_block: i64,
    pub updated_tx: String,
    pub metadata: Option<TaskMetadataResponse>,
}

impl From<(TaskRow, Option<TaskMetadataRow>)> for TaskResponse {
    fn from((task, metadata): (TaskRow, Option<TaskMetadataRow>)) -> Self {
        Self {
            task_id: task.task_id,
            requester: task.requester,
            spec_hash: task.spec_hash,
            payout_amount: task.payout_amount,
            max_winners: task.max_winners,
            deposit_fee_amount: task.deposit_fee_amount,
            recipient_fee_amount: task.recipient_fee_amount,
            balance: task.balance,
            deadline: task.deadline,
            review_window: task.review_window,
            escalation_window: task.escalation_window,
            approved_count: task.approved_count,
            withdrawn_count: task.withdrawn_count,
            pending_submissions: task.pending_submissions,
            submission_count: task.submission_count,
            claim_count: task.claim_count,
            status: task.status,
            created_block: task.created_block,
            created_tx: task.created_tx,
            updated_block: task.updated_block,
            updated_tx: task.updated_tx,
            metadata: metadata.map(TaskMetadataResponse::from),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub task_id: String,
    pub submission_id: i64,
    pub agent: Option<String>,
    pub status: i32,
    pub submitted_at: Option<i64>,
    pub proof_hash: Option<String>,
    /// Only served to the task requester or the submission agent.
    pub proof_text: Option<String>,
    pub created_block: i64,
    pub created_tx: String,
    pub updated_block: i64,
    pub updated_tx: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub block_number: i64,
    pub log_index: i64,
    pub tx_hash: String,
    pub block_hash: String,
    pub event_name: String,
    pub task_id: Option<String>,
    pub args: serde_json::Value,
}

pub async fn list_tasks(
    req: HttpRequest,
    ctx: web::Data<ApiContext>,
) -> Result<HttpResponse, ApiError> {
    ctx.limiter.check(&req)?;
    let repository = ctx.repository.clone();
    let rows =
        blocking(move || repository.latest_tasks(TASK_LIST_LIMIT)).await?;
    let tasks: Vec<TaskResponse> =
        rows.into_iter().map(TaskResponse::from).collect();
    Ok(HttpResponse::Ok().json(tasks))
}

pub async fn get_task(
    req: HttpRequest,
    ctx: web::Data<ApiContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    ctx.limiter.check(&req)?;
    let task_id = parse_task_id(&path)?;

    let repository = ctx.repository.clone();
    let lookup_id = task_id.clone();
    let task = blocking(move || repository.task(&lookup_id))
        .await?
        .ok_or_else(|| ApiError::not_found("unknown task"))?;

    let repository = ctx.repository.clone();
    let metadata =
        blocking(move || repository.task_metadata(&task_id)).await?;
    Ok(HttpResponse::Ok().json(TaskResponse::from((task, metadata))))
}

pub async fn list_submissions(
    req: HttpRequest,
    ctx: web::Data<ApiContext>,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    ctx.limiter.check(&req)?;
    let viewer =
        authenticate(&ctx.repository, &ctx.auth, &req, &body).await?;
    let task_id = parse_task_id(&path)?;

    let repository = ctx.repository.clone();
    let lookup_id = task_id.clone();
    let task = blocking(move || repository.task(&lookup_id))
        .await?
        .ok_or_else(|| ApiError::not_found("unknown task"))?;

    let repository = ctx.repository.clone();
    let lookup_id = task_id.clone();
    let cap = ctx.submissions_cap;
    let submissions =
        blocking(move || repository.submissions(&lookup_id, cap)).await?;

    let repository = ctx.repository.clone();
    let lookup_id = task_id.clone();
    let proofs =
        blocking(move || repository.proofs_for_task(&lookup_id)).await?;
    let latest_proofs = latest_by_submission(proofs);

    let responses: Vec<SubmissionResponse> = submissions
        .into_iter()
        .map(|submission| {
            let proof_text = visible_proof_text(
                viewer.as_deref(),
                &task,
                &submission,
                &latest_proofs,
            );
            SubmissionResponse {
                task_id: submission.task_id,
                submission_id: submission.submission_id,
                agent: submission.agent,
                status: submission.status,
                submitted_at: submission.submitted_at,
                proof_hash: submission.proof_hash,
                proof_text,
                created_block: submission.created_block,
                created_tx: submission.created_tx,
                updated_block: submission.updated_block,
                updated_tx: submission.updated_tx,
            }
        })
        .collect();
    Ok(HttpResponse::Ok().json(responses))
}

fn latest_by_submission(proofs: Vec<ProofRow>) -> HashMap<i64, String> {
    // Ordered (submission_id asc, id desc): first hit per submission wins.
    let mut latest = HashMap::new();
    for proof in proofs {
        latest.entry(proof.submission_id).or_insert(proof.proof_text);
    }
    latest
}

fn visible_proof_text(
    viewer: Option<&str>,
    task: &TaskRow,
    submission: &SubmissionRow,
    latest_proofs: &HashMap<i64, String>,
) -> Option<String> {
    let viewer = viewer?;
    let is_requester = task.requester.as_deref() == Some(viewer);
    let is_agent = submission.agent.as_deref() == Some(viewer);
    if is_requester || is_agent {
        latest_proofs.get(&submission.submission_id).cloned()
    } else {
        None
    }
}

pub async fn list_events(
    req: HttpRequest,
    ctx: web::Data<ApiContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    ctx.limiter.check(&req)?;
    let task_id = parse_task_id(&path)?;

    let repository = ctx.repository.clone();
    let events =
        blocking(move || repository.events_for_task(&task_id)).await?;
    let responses: Vec<EventResponse> = events
        .into_iter()
        .map(|event| EventResponse {
            block_number: event.block_number,
            log_index: event.log_index,
            tx_hash: event.tx_hash,
            block_hash: event.block_hash,
            event_name: event.event_name,
            task_id: event.task_id,
            args: serde_json::from_str(&event.args)
                .unwrap_or(serde_json::Value::Null),
        })
        .collect();
    Ok(HttpResponse::Ok().json(responses))
}

/// Legacy compatibility shim: funding state now comes from the projection
/// rather than a live chain probe.
pub async fn check_funding(
    req: HttpRequest,
    ctx: web::Data<ApiContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    ctx.limiter.check(&req)?;
    let task_id = parse_task_id(&path)?;

    let repository = ctx.repository.clone();
    let lookup_id = task_id.clone();
    let task = blocking(move || repository.task(&lookup_id))
        .await?
        .ok_or_else(|| ApiError::not_found("unknown task"))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "taskId": task.task_id,
        "status": task.status,
        "balance": task.balance,
        "funded": task.status == TaskStatus::Funded as i32,
    })))
}

pub async fn wallet_tasks(
    req: HttpRequest,
    ctx: web::Data<ApiContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    ctx.limiter.check(&req)?;
    let address = Address::from_str(&path).map_err(|_| {
        ApiError::validation("address must be a 20-byte hex address")
    })?;
    let wallet = hex_address(&address);

    let repository = ctx.repository.clone();
    let rows = blocking(move || {
        repository.tasks_for_wallet(&wallet, TASK_LIST_LIMIT)
    })
    .await?;
    let tasks: Vec<TaskResponse> =
        rows.into_iter().map(TaskResponse::from).collect();
    Ok(HttpResponse::Ok().json(tasks))
}
