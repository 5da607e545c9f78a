// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

diesel::table! {
    escrow_indexer_cursor (chain_id, contract_address) {
        chain_id -> BigInt,
        contract_address -> Text,
        last_processed_block -> BigInt,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    escrow_events (chain_id, contract_address, tx_hash, log_index) {
        chain_id -> BigInt,
        contract_address -> Text,
        tx_hash -> Text,
        log_index -> BigInt,
        block_number -> BigInt,
        block_hash -> Text,
        event_name -> Text,
        task_id -> Nullable<Text>,
        args -> Text,
    }
}

diesel::table! {
    escrow_tasks (chain_id, contract_address, task_id) {
        chain_id -> BigInt,
        contract_address -> Text,
        task_id -> Text,
        requester -> Nullable<Text>,
        spec_hash -> Nullable<Text>,
        payout_amount -> Nullable<Text>,
        max_winners -> Nullable<Integer>,
        deposit_fee_amount -> Nullable<Text>,
        recipient_fee_amount -> Nullable<Text>,
        balance -> Nullable<Text>,
        deadline -> Nullable<BigInt>,
        review_window -> Nullable<BigInt>,
        escalation_window -> Nullable<BigInt>,
        approved_count -> Integer,
        withdrawn_count -> Integer,
        pending_submissions -> Integer,
        submission_count -> BigInt,
        claim_count -> BigInt,
        status -> Integer,
        created_block -> BigInt,
        created_tx -> Text,
        updated_block -> BigInt,
        updated_tx -> Text,
    }
}

diesel::table! {
    escrow_submissions (chain_id, contract_address, task_id, submission_id) {
        chain_id -> BigInt,
        contract_address -> Text,
        task_id -> Text,
        submission_id -> BigInt,
        agent -> Nullable<Text>,
        status -> Integer,
        submitted_at -> Nullable<BigInt>,
        proof_hash -> Nullable<Text>,
        created_block -> BigInt,
        created_tx -> Text,
        updated_block -> BigInt,
        updated_tx -> Text,
    }
}

diesel::table! {
    escrow_submission_proofs (id) {
        id -> BigInt,
        chain_id -> BigInt,
        contract_address -> Text,
        task_id -> Text,
        submission_id -> BigInt,
        wallet -> Text,
        proof_text -> Text,
        proof_hash -> Text,
        tx_hash -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    escrow_task_metadata (chain_id, contract_address, task_id) {
        chain_id -> BigInt,
        contract_address -> Text,
        task_id -> Text,
        spec_hash -> Text,
        title -> Text,
        instructions -> Text,
        created_by -> Text,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    escrow_used_nonces (nonce) {
        nonce -> Text,
        expires_at -> BigInt,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    escrow_events,
    escrow_tasks,
    escrow_submissions,
    escrow_submission_proofs,
    escrow_task_metadata,
);
