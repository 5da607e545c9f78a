// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Event application rules. Each log runs in one transaction: the event
//! journal insert and its projection side-effects commit together, so "the
//! event record exists" always implies "its side-effects were applied".
//! Duplicate deliveries (poll vs. tail) hit the journal primary key and are
//! skipped whole, which keeps every counter exact.

use diesel::sqlite::SqliteConnection;
use diesel::{insert_into, prelude::*};
use snafu::ResultExt;

use escrow_events::{hex_address, hex_hash, DecodedLog, EscrowEvent, LogProvenance};

use super::error::{DatabaseSnafu, Error, SubmissionIdOverflowSnafu};
use super::repository::Repository;
use super::schema;
use super::types::{
    EventRow, SubmissionRow, SubmissionStatus, TaskRow, TaskStatus,
};

/// Outcome of applying one decoded log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedEvent {
    Applied,
    /// The journal already held this `(tx_hash, log_index)`.
    Duplicate,
}

impl Repository {
    pub fn apply_event(
        &self,
        decoded: &DecodedLog,
    ) -> Result<AppliedEvent, Error> {
        if let Some(value) = submission_id_of(&decoded.event) {
            snafu::ensure!(
                i64::try_from(value).is_ok(),
                SubmissionIdOverflowSnafu { value }
            );
        }

        let row = self.event_row(decoded);
        let scope = Scope {
            chain_id: self.chain_id,
            contract_address: self.contract_address.clone(),
        };
        let mut conn = self.conn()?;
        let outcome = conn
            .immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                use schema::escrow_events::dsl;
                let inserted = insert_into(dsl::escrow_events)
                    .values(&row)
                    .on_conflict_do_nothing()
                    .execute(conn)?;
                if inserted == 0 {
                    return Ok(AppliedEvent::Duplicate);
                }
                project(conn, &scope, &decoded.event, &decoded.provenance)?;
                Ok(AppliedEvent::Applied)
            })
            .context(DatabaseSnafu)?;

        tracing::trace!(
            event = decoded.event_name,
            tx_hash = %row.tx_hash,
            log_index = row.log_index,
            ?outcome,
            "event was applied to the projection"
        );
        Ok(outcome)
    }

    fn event_row(&self, decoded: &DecodedLog) -> EventRow {
        EventRow {
            chain_id: self.chain_id,
            contract_address: self.contract_address.clone(),
            tx_hash: hex_hash(&decoded.provenance.tx_hash),
            log_index: decoded.provenance.log_index as i64,
            block_number: decoded.provenance.block_number as i64,
            block_hash: hex_hash(&decoded.provenance.block_hash),
            event_name: decoded.event_name.to_owned(),
            task_id: decoded.task_id.map(|id| id.to_string()),
            args: serde_json::Value::Object(decoded.args.clone())
                .to_string(),
        }
    }
}

struct Scope {
    chain_id: i64,
    contract_address: String,
}

fn submission_id_of(event: &EscrowEvent) -> Option<u64> {
    match event {
        EscrowEvent::Claimed { submission_id, .. }
        | EscrowEvent::ProofSubmitted { submission_id, .. }
        | EscrowEvent::Approved { submission_id, .. }
        | EscrowEvent::Rejected { submission_id, .. }
        | EscrowEvent::Withdrawn { submission_id, .. }
        | EscrowEvent::DisputeOpened { submission_id, .. }
        | EscrowEvent::DisputeResolved { submission_id, .. } => {
            Some(*submission_id)
        }
        _ => None,
    }
}

fn project(
    conn: &mut SqliteConnection,
    scope: &Scope,
    event: &EscrowEvent,
    provenance: &LogProvenance,
) -> Result<(), diesel::result::Error> {
    let task_id = event.task_id().to_string();
    match event {
        EscrowEvent::TaskCreated {
            requester,
            payout_amount,
            max_winners,
            deadline,
            spec_hash,
            ..
        } => match load_task(conn, scope, &task_id)? {
            None => {
                let mut task = blank_task(scope, &task_id, provenance);
                task.requester = Some(hex_address(requester));
                task.spec_hash = Some(hex_hash(spec_hash));
                task.payout_amount = Some(payout_amount.to_string());
                task.max_winners = Some(*max_winners as i32);
                task.deadline = Some(*deadline as i64);
                task.status = TaskStatus::Created as i32;
                insert_task(conn, &task)
            }
            Some(mut task) => {
                // Retroactive create (re-scan): refresh the immutable
                // fields, keep counters, never lower the status.
                task.requester = Some(hex_address(requester));
                task.spec_hash = Some(hex_hash(spec_hash));
                task.payout_amount = Some(payout_amount.to_string());
                task.max_winners = Some(*max_winners as i32);
                task.deadline = Some(*deadline as i64);
                task.status = task.status.max(TaskStatus::Created as i32);
                touch_task(&mut task, provenance);
                save_task(conn, &task)
            }
        },

        EscrowEvent::TaskFunded {
            escrowed_amount,
            deposit_fee_paid,
            ..
        } => {
            let mut task = ensure_task(conn, scope, &task_id, provenance)?;
            task.status = TaskStatus::Funded as i32;
            task.balance = Some(escrowed_amount.to_string());
            task.deposit_fee_amount = Some(deposit_fee_paid.to_string());
            touch_task(&mut task, provenance);
            save_task(conn, &task)
        }

        EscrowEvent::Claimed {
            submission_id,
            agent,
            ..
        } => {
            let mut task = ensure_task(conn, scope, &task_id, provenance)?;
            upsert_submission(
                conn,
                scope,
                &task_id,
                *submission_id as i64,
                provenance,
                |submission| {
                    if submission.agent.is_none() {
                        submission.agent = Some(hex_address(agent));
                    }
                    submission.status = SubmissionStatus::Claimed as i32;
                },
            )?;
            task.claim_count += 1;
            touch_task(&mut task, provenance);
            save_task(conn, &task)
        }

        EscrowEvent::ProofSubmitted {
            submission_id,
            agent,
            proof_hash,
            submitted_at,
            ..
        } => {
            let mut task = ensure_task(conn, scope, &task_id, provenance)?;
            let previous = upsert_submission(
                conn,
                scope,
                &task_id,
                *submission_id as i64,
                provenance,
                |submission| {
                    if submission.agent.is_none() {
                        submission.agent = Some(hex_address(agent));
                    }
                    submission.status = SubmissionStatus::Submitted as i32;
                    submission.proof_hash = Some(hex_hash(proof_hash));
                    if let Some(at) = submitted_at {
                        submission.submitted_at = Some(*at as i64);
                    }
                },
            )?;
            if previous <= SubmissionStatus::Claimed as i32 {
                // First proof for this submission.
                task.submission_count += 1;
                task.pending_submissions += 1;
                touch_task(&mut task, provenance);
                save_task(conn, &task)?;
            }
            Ok(())
        }

        EscrowEvent::Approved { submission_id, .. } => resolve_submission(
            conn,
            scope,
            &task_id,
            *submission_id as i64,
            true,
            provenance,
        ),

        EscrowEvent::Rejected { submission_id, .. } => resolve_submission(
            conn,
            scope,
            &task_id,
            *submission_id as i64,
            false,
            provenance,
        ),

        EscrowEvent::DisputeResolved {
            submission_id,
            approved,
            ..
        } => resolve_submission(
            conn,
            scope,
            &task_id,
            *submission_id as i64,
            *approved,
            provenance,
        ),

        EscrowEvent::Withdrawn {
            submission_id,
            recipient_fee,
            ..
        } => {
            let mut task = ensure_task(conn, scope, &task_id, provenance)?;
            upsert_submission(
                conn,
                scope,
                &task_id,
                *submission_id as i64,
                provenance,
                |submission| {
                    submission.status = SubmissionStatus::Withdrawn as i32;
                },
            )?;
            task.withdrawn_count += 1;
            task.recipient_fee_amount = Some(recipient_fee.to_string());
            touch_task(&mut task, provenance);
            save_task(conn, &task)
        }

        EscrowEvent::DisputeOpened { submission_id, .. } => {
            ensure_task(conn, scope, &task_id, provenance)?;
            upsert_submission(
                conn,
                scope,
                &task_id,
                *submission_id as i64,
                provenance,
                |submission| {
                    submission.status = SubmissionStatus::Disputed as i32;
                },
            )?;
            Ok(())
        }

        EscrowEvent::TaskCancelled { .. }
        | EscrowEvent::TaskRefunded { .. } => {
            let mut task = ensure_task(conn, scope, &task_id, provenance)?;
            task.status = TaskStatus::Cancelled as i32;
            task.balance = Some("0".to_owned());
            touch_task(&mut task, provenance);
            save_task(conn, &task)
        }

        EscrowEvent::TaskClosed { .. } => {
            let mut task = ensure_task(conn, scope, &task_id, provenance)?;
            task.status = TaskStatus::Closed as i32;
            task.balance = Some("0".to_owned());
            touch_task(&mut task, provenance);
            save_task(conn, &task)
        }
    }
}

/// Terminal review decision; shared by Approved, Rejected and
/// DisputeResolved.
fn resolve_submission(
    conn: &mut SqliteConnection,
    scope: &Scope,
    task_id: &str,
    submission_id: i64,
    approved: bool,
    provenance: &LogProvenance,
) -> Result<(), diesel::result::Error> {
    let mut task = ensure_task(conn, scope, task_id, provenance)?;
    upsert_submission(conn, scope, task_id, submission_id, provenance, |s| {
        s.status = if approved {
            SubmissionStatus::Approved as i32
        } else {
            SubmissionStatus::Rejected as i32
        };
    })?;
    if approved {
        task.approved_count += 1;
        if let Some(max_winners) = task.max_winners {
            if task.approved_count >= max_winners {
                task.status = task.status.max(TaskStatus::Completed as i32);
            }
        }
    }
    if task.pending_submissions > 0 {
        task.pending_submissions -= 1;
    }
    touch_task(&mut task, provenance);
    save_task(conn, &task)
}

fn blank_task(
    scope: &Scope,
    task_id: &str,
    provenance: &LogProvenance,
) -> TaskRow {
    TaskRow {
        chain_id: scope.chain_id,
        contract_address: scope.contract_address.clone(),
        task_id: task_id.to_owned(),
        requester: None,
        spec_hash: None,
        payout_amount: None,
        max_winners: None,
        deposit_fee_amount: None,
        recipient_fee_amount: None,
        balance: None,
        deadline: None,
        review_window: None,
        escalation_window: None,
        approved_count: 0,
        withdrawn_count: 0,
        pending_submissions: 0,
        submission_count: 0,
        claim_count: 0,
        status: TaskStatus::None as i32,
        created_block: provenance.block_number as i64,
        created_tx: hex_hash(&provenance.tx_hash),
        updated_block: provenance.block_number as i64,
        updated_tx: hex_hash(&provenance.tx_hash),
    }
}

fn load_task(
    conn: &mut SqliteConnection,
    scope: &Scope,
    task_id: &str,
) -> Result<Option<TaskRow>, diesel::result::Error> {
    use schema::escrow_tasks::dsl;
    dsl::escrow_tasks
        .find((scope.chain_id, scope.contract_address.clone(), task_id))
        .first::<TaskRow>(conn)
        .optional()
}

fn insert_task(
    conn: &mut SqliteConnection,
    task: &TaskRow,
) -> Result<(), diesel::result::Error> {
    use schema::escrow_tasks::dsl;
    insert_into(dsl::escrow_tasks).values(task).execute(conn)?;
    Ok(())
}

fn save_task(
    conn: &mut SqliteConnection,
    task: &TaskRow,
) -> Result<(), diesel::result::Error> {
    use schema::escrow_tasks::dsl;
    diesel::update(dsl::escrow_tasks.find((
        task.chain_id,
        task.contract_address.clone(),
        task.task_id.clone(),
    )))
    .set(task)
    .execute(conn)?;
    Ok(())
}

/// Events may arrive for tasks the backfill has not created yet (tail ahead
/// of poll); a blank row keeps the update path uniform.
fn ensure_task(
    conn: &mut SqliteConnection,
    scope: &Scope,
    task_id: &str,
    provenance: &LogProvenance,
) -> Result<TaskRow, diesel::result::Error> {
    match load_task(conn, scope, task_id)? {
        Some(task) => Ok(task),
        None => {
            let task = blank_task(scope, task_id, provenance);
            insert_task(conn, &task)?;
            Ok(task)
        }
    }
}

fn touch_task(task: &mut TaskRow, provenance: &LogProvenance) {
    task.updated_block = provenance.block_number as i64;
    task.updated_tx = hex_hash(&provenance.tx_hash);
}

/// Loads or creates the submission, applies `mutate`, persists, and returns
/// the status the row had before the mutation.
fn upsert_submission<F>(
    conn: &mut SqliteConnection,
    scope: &Scope,
    task_id: &str,
    submission_id: i64,
    provenance: &LogProvenance,
    mutate: F,
) -> Result<i32, diesel::result::Error>
where
    F: FnOnce(&mut SubmissionRow),
{
    use schema::escrow_submissions::dsl;
    let existing = dsl::escrow_submissions
        .find((
            scope.chain_id,
            scope.contract_address.clone(),
            task_id,
            submission_id,
        ))
        .first::<SubmissionRow>(conn)
        .optional()?;

    match existing {
        Some(mut submission) => {
            let previous = submission.status;
            mutate(&mut submission);
            submission.updated_block = provenance.block_number as i64;
            submission.updated_tx = hex_hash(&provenance.tx_hash);
            diesel::update(dsl::escrow_submissions.find((
                submission.chain_id,
                submission.contract_address.clone(),
                submission.task_id.clone(),
                submission.submission_id,
            )))
            .set(&submission)
            .execute(conn)?;
            Ok(previous)
        }
        None => {
            let mut submission = SubmissionRow {
                chain_id: scope.chain_id,
                contract_address: scope.contract_address.clone(),
                task_id: task_id.to_owned(),
                submission_id,
                agent: None,
                status: SubmissionStatus::None as i32,
                submitted_at: None,
                proof_hash: None,
                created_block: provenance.block_number as i64,
                created_tx: hex_hash(&provenance.tx_hash),
                updated_block: provenance.block_number as i64,
                updated_tx: hex_hash(&provenance.tx_hash),
            };
            mutate(&mut submission);
            insert_into(dsl::escrow_submissions)
                .values(&submission)
                .execute(conn)?;
            Ok(SubmissionStatus::None as i32)
        }
    }
}
