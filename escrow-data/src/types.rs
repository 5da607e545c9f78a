// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use diesel::{AsChangeset, Insertable, Queryable, QueryableByName};

use super::schema::{
    escrow_events, escrow_indexer_cursor, escrow_submission_proofs,
    escrow_submissions, escrow_task_metadata, escrow_tasks,
    escrow_used_nonces,
};

/// Task lifecycle; the numeric order is the monotonic status order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum TaskStatus {
    None = 0,
    Created = 1,
    Funded = 2,
    Cancelled = 3,
    Completed = 4,
    Closed = 5,
}

impl TaskStatus {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(TaskStatus::None),
            1 => Some(TaskStatus::Created),
            2 => Some(TaskStatus::Funded),
            3 => Some(TaskStatus::Cancelled),
            4 => Some(TaskStatus::Completed),
            5 => Some(TaskStatus::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SubmissionStatus {
    None = 0,
    Claimed = 1,
    Submitted = 2,
    Approved = 3,
    Rejected = 4,
    Withdrawn = 5,
    Disputed = 6,
}

impl SubmissionStatus {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(SubmissionStatus::None),
            1 => Some(SubmissionStatus::Claimed),
            2 => Some(SubmissionStatus::Submitted),
            3 => Some(SubmissionStatus::Approved),
            4 => Some(SubmissionStatus::Rejected),
            5 => Some(SubmissionStatus::Withdrawn),
            6 => Some(SubmissionStatus::Disputed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Insertable, PartialEq, Queryable, QueryableByName)]
#[diesel(table_name = escrow_indexer_cursor)]
pub struct CursorRow {
    pub chain_id: i64,
    pub contract_address: String,
    pub last_processed_block: i64,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Insertable, PartialEq, Queryable, QueryableByName)]
#[diesel(table_name = escrow_events)]
pub struct EventRow {
    pub chain_id: i64,
    pub contract_address: String,
    pub tx_hash: String,
    pub log_index: i64,
    pub block_number: i64,
    pub block_hash: String,
    pub event_name: String,
    pub task_id: Option<String>,
    pub args: String,
}

#[derive(
    AsChangeset, Clone, Debug, Insertable, PartialEq, Queryable,
    QueryableByName,
)]
#[diesel(table_name = escrow_tasks)]
pub struct TaskRow {
    pub chain_id: i64,
    pub contract_address: String,
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
}

#[derive(
    AsChangeset, Clone, Debug, Insertable, PartialEq, Queryable,
    QueryableByName,
)]
#[diesel(table_name = escrow_submissions)]
pub struct SubmissionRow {
    pub chain_id: i64,
    pub contract_address: String,
    pub task_id: String,
    pub submission_id: i64,
    pub agent: Option<String>,
    pub status: i32,
    pub submitted_at: Option<i64>,
    pub proof_hash: Option<String>,
    pub created_block: i64,
    pub created_tx: String,
    pub updated_block: i64,
    pub updated_tx: String,
}

#[derive(Clone, Debug, PartialEq, Queryable, QueryableByName)]
#[diesel(table_name = escrow_submission_proofs)]
pub struct ProofRow {
    pub id: i64,
    pub chain_id: i64,
    pub contract_address: String,
    pub task_id: String,
    pub submission_id: i64,
    pub wallet: String,
    pub proof_text: String,
    pub proof_hash: String,
    pub tx_hash: Option<String>,
    pub created_at: chrono::NaiveDateTime,
}

/// Insert shape for the append-only proof journal; `id` is assigned by the
/// store.
#[derive(Clone, Debug, Insertable)]
#[diesel(table_name = escrow_submission_proofs)]
pub struct NewProofRow {
    pub chain_id: i64,
    pub contract_address: String,
    pub task_id: String,
    pub submission_id: i64,
    pub wallet: String,
    pub proof_text: String,
    pub proof_hash: String,
    pub tx_hash: Option<String>,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(
    AsChangeset, Clone, Debug, Insertable, PartialEq, Queryable,
    QueryableByName,
)]
#[diesel(table_name = escrow_task_metadata)]
pub struct TaskMetadataRow {
    pub chain_id: i64,
    pub contract_address: String,
    pub task_id: String,
    pub spec_hash: String,
    pub title: String,
    pub instructions: String,
    pub created_by: String,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Insertable, PartialEq, Queryable)]
#[diesel(table_name = escrow_used_nonces)]
pub struct NonceRow {
    pub nonce: String,
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_round_trip() {
        for value in 0..=5 {
            let status = TaskStatus::from_i32(value).unwrap();
            assert_eq!(status as i32, value);
        }
        assert_eq!(TaskStatus::from_i32(6), None);
    }

    #[test]
    fn task_status_order_is_monotonic() {
        assert!(TaskStatus::Created < TaskStatus::Funded);
        assert!(TaskStatus::Funded < TaskStatus::Completed);
        assert!(TaskStatus::Completed < TaskStatus::Closed);
    }

    #[test]
    fn submission_status_round_trip() {
        for value in 0..=6 {
            let status = SubmissionStatus::from_i32(value).unwrap();
            assert_eq!(status as i32, value);
        }
        assert_eq!(SubmissionStatus::from_i32(7), None);
    }
}
