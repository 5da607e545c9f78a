// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use ethers::types::{Address, H256, U256};

/// One escrow contract event, fully typed. Produced by the decoder and
/// consumed by the projection; widths match the on-chain encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum EscrowEvent {
    TaskCreated {
        task_id: U256,
        requester: Address,
        payout_amount: u128,
        max_winners: u16,
        deadline: u64,
        spec_hash: H256,
    },
    TaskFunded {
        task_id: U256,
        requester: Address,
        escrowed_amount: U256,
        deposit_fee_paid: U256,
    },
    Claimed {
        task_id: U256,
        submission_id: u64,
        agent: Address,
    },
    ProofSubmitted {
        task_id: U256,
        submission_id: u64,
        agent: Address,
        proof_hash: H256,
        /// Present only when the contract revision emits it.
        submitted_at: Option<u64>,
    },
    Approved {
        task_id: U256,
        submission_id: u64,
        approver: Address,
    },
    Rejected {
        task_id: U256,
        submission_id: u64,
        approver: Address,
    },
    Withdrawn {
        task_id: U256,
        submission_id: u64,
        agent: Address,
        net_payout: U256,
        recipient_fee: U256,
    },
    DisputeOpened {
        task_id: U256,
        submission_id: u64,
        by: Address,
    },
    DisputeResolved {
        task_id: U256,
        submission_id: u64,
        by: Address,
        approved: bool,
    },
    TaskClosed {
        task_id: U256,
        requester: Address,
        refunded: U256,
    },
    TaskCancelled {
        task_id: U256,
        requester: Address,
        refunded: U256,
    },
    TaskRefunded {
        task_id: U256,
        requester: Address,
        refunded: U256,
        reason: String,
    },
}

impl EscrowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EscrowEvent::TaskCreated { .. } => "TaskCreated",
            EscrowEvent::TaskFunded { .. } => "TaskFunded",
            EscrowEvent::Claimed { .. } => "Claimed",
            EscrowEvent::ProofSubmitted { .. } => "ProofSubmitted",
            EscrowEvent::Approved { .. } => "Approved",
            EscrowEvent::Rejected { .. } => "Rejected",
            EscrowEvent::Withdrawn { .. } => "Withdrawn",
            EscrowEvent::DisputeOpened { .. } => "DisputeOpened",
            EscrowEvent::DisputeResolved { .. } => "DisputeResolved",
            EscrowEvent::TaskClosed { .. } => "TaskClosed",
            EscrowEvent::TaskCancelled { .. } => "TaskCancelled",
            EscrowEvent::TaskRefunded { .. } => "TaskRefunded",
        }
    }

    pub fn task_id(&self) -> U256 {
        match self {
            EscrowEvent::TaskCreated { task_id, .. }
            | EscrowEvent::TaskFunded { task_id, .. }
            | EscrowEvent::Claimed { task_id, .. }
            | EscrowEvent::ProofSubmitted { task_id, .. }
            | EscrowEvent::Approved { task_id, .. }
            | EscrowEvent::Rejected { task_id, .. }
            | EscrowEvent::Withdrawn { task_id, .. }
            | EscrowEvent::DisputeOpened { task_id, .. }
            | EscrowEvent::DisputeResolved { task_id, .. }
            | EscrowEvent::TaskClosed { task_id, .. }
            | EscrowEvent::TaskCancelled { task_id, .. }
            | EscrowEvent::TaskRefunded { task_id, .. } => *task_id,
        }
    }
}
