// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use ethers::abi::{Event, HumanReadableParser};
use ethers::types::{Address, Filter, ValueOrArray, H256};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// The closed set of events emitted by the escrow contract. Field order
/// matches the on-chain encoding; anything outside this set is undecodable.
const EVENT_DECLARATIONS: &[&str] = &[
    "event TaskCreated(uint256 indexed taskId, address indexed requester, uint128 payoutAmount, uint16 maxWinners, uint40 deadline, bytes32 specHash)",
    "event TaskFunded(uint256 indexed taskId, address indexed requester, uint256 escrowedAmount, uint256 depositFeePaid)",
    "event Claimed(uint256 indexed taskId, uint256 indexed submissionId, address indexed agent)",
    "event ProofSubmitted(uint256 indexed taskId, uint256 indexed submissionId, address indexed agent, bytes32 proofHash)",
    "event Approved(uint256 indexed taskId, uint256 indexed submissionId, address indexed approver)",
    "event Rejected(uint256 indexed taskId, uint256 indexed submissionId, address indexed approver)",
    "event Withdrawn(uint256 indexed taskId, uint256 indexed submissionId, address indexed agent, uint256 netPayout, uint256 recipientFee)",
    "event DisputeOpened(uint256 indexed taskId, uint256 indexed submissionId, address indexed by)",
    "event DisputeResolved(uint256 indexed taskId, uint256 indexed submissionId, address indexed by, bool approved)",
    "event TaskClosed(uint256 indexed taskId, address indexed requester, uint256 refunded)",
    "event TaskCancelled(uint256 indexed taskId, address indexed requester, uint256 refunded)",
    "event TaskRefunded(uint256 indexed taskId, address indexed requester, uint256 refunded, string reason)",
];

pub const EVENT_NAMES: &[&str] = &[
    "TaskCreated",
    "TaskFunded",
    "Claimed",
    "ProofSubmitted",
    "Approved",
    "Rejected",
    "Withdrawn",
    "DisputeOpened",
    "DisputeResolved",
    "TaskClosed",
    "TaskCancelled",
    "TaskRefunded",
];

/// topic0 -> parsed ABI event, built once from the declarations above.
pub(crate) static EVENTS_BY_TOPIC: Lazy<HashMap<H256, Event>> = Lazy::new(|| {
    EVENT_DECLARATIONS
        .iter()
        .map(|declaration| {
            let event = HumanReadableParser::parse_event(declaration)
                .expect("static event declaration must parse");
            (event.signature(), event)
        })
        .collect()
});

/// All known topic0 values, in declaration order.
pub fn event_signatures() -> Vec<H256> {
    EVENT_DECLARATIONS
        .iter()
        .map(|declaration| {
            HumanReadableParser::parse_event(declaration)
                .expect("static event declaration must parse")
                .signature()
        })
        .collect()
}

/// Log filter matching the contract address and the union of known event
/// topics. Both the backfill and the live tail use this exact filter.
pub fn log_filter(contract_address: Address) -> Filter {
    let topics = event_signatures().into_iter().map(Some).collect();
    Filter::new()
        .address(contract_address)
        .topic0(ValueOrArray::Array(topics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::utils::keccak256;

    #[test]
    fn registry_covers_the_whole_event_set() {
        assert_eq!(EVENTS_BY_TOPIC.len(), EVENT_NAMES.len());
        for name in EVENT_NAMES {
            assert!(
                EVENTS_BY_TOPIC.values().any(|e| e.name == *name),
                "missing event {}",
                name
            );
        }
    }

    #[test]
    fn task_created_signature_matches_canonical_form() {
        let expected = H256::from(keccak256(
            "TaskCreated(uint256,address,uint128,uint16,uint40,bytes32)",
        ));
        assert!(EVENTS_BY_TOPIC.contains_key(&expected));
    }

    #[test]
    fn filter_carries_every_topic() {
        let filter = log_filter(Address::zero());
        match filter.topics[0].as_ref() {
            Some(ValueOrArray::Array(topics)) => {
                assert_eq!(topics.len(), EVENT_DECLARATIONS.len())
            }
            other => panic!("unexpected topic0 filter: {:?}", other),
        }
    }
}
