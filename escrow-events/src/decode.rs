// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use ethers::abi::{LogParam, RawLog, Token};
use ethers::types::{Address, Log, H256, U256};
use serde_json::{Map, Value};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::abi::EVENTS_BY_TOPIC;
use crate::events::EscrowEvent;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DecodeError {
    #[snafu(display("log emitted by foreign address {:#x}", address))]
    ForeignAddress { address: Address },

    #[snafu(display("unknown event topic {:?}", topic))]
    UnknownTopic { topic: Option<H256> },

    #[snafu(display("log does not match the event ABI"))]
    AbiMismatch { source: ethers::abi::Error },

    #[snafu(display("malformed event argument `{}`", name))]
    MalformedArgument { name: String },

    #[snafu(display("log is missing block provenance (pending?)"))]
    MissingProvenance,
}

/// Where a log sits in the chain. Composes the event-journal primary key
/// together with the chain id and contract address.
#[derive(Debug, Clone, PartialEq)]
pub struct LogProvenance {
    pub block_number: u64,
    pub block_hash: H256,
    pub tx_hash: H256,
    pub log_index: u64,
}

/// Canonical record of one decoded log: the raw named arguments (uints as
/// decimal strings) next to the typed event the projection consumes.
#[derive(Debug, Clone)]
pub struct DecodedLog {
    pub event_name: &'static str,
    pub task_id: Option<U256>,
    pub args: Map<String, Value>,
    pub event: EscrowEvent,
    pub provenance: LogProvenance,
}

/// Decode a raw log into a typed escrow event. Fails with a typed error so
/// the indexer can count undecodable logs without aborting the batch.
pub fn decode_log(
    contract_address: Address,
    log: &Log,
) -> Result<DecodedLog, DecodeError> {
    snafu::ensure!(
        log.address == contract_address,
        ForeignAddressSnafu {
            address: log.address
        }
    );

    let topic0 = log.topics.first().copied();
    let event = topic0
        .and_then(|topic| EVENTS_BY_TOPIC.get(&topic))
        .context(UnknownTopicSnafu { topic: topic0 })?;

    let raw = RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    };
    let parsed = event.parse_log(raw).context(AbiMismatchSnafu)?;

    let provenance = provenance(log)?;
    let args = args_to_json(&parsed.params);
    let task_id = first_indexed_uint(event, &parsed.params);
    let typed = typed_event(&event.name, &parsed.params)?;

    Ok(DecodedLog {
        event_name: typed.name(),
        task_id,
        args,
        event: typed,
        provenance,
    })
}

fn provenance(log: &Log) -> Result<LogProvenance, DecodeError> {
    Ok(LogProvenance {
        block_number: log
            .block_number
            .context(MissingProvenanceSnafu)?
            .as_u64(),
        block_hash: log.block_hash.context(MissingProvenanceSnafu)?,
        tx_hash: log.transaction_hash.context(MissingProvenanceSnafu)?,
        log_index: uint_to_u64(
            log.log_index.context(MissingProvenanceSnafu)?,
            "logIndex",
        )?,
    })
}

/// Big integers stay decimal strings; they must survive a JSON round-trip
/// without precision loss.
fn token_to_json(token: &Token) -> Value {
    match token {
        Token::Uint(u) | Token::Int(u) => Value::String(u.to_string()),
        Token::Address(a) => Value::String(format!("{:#x}", a)),
        Token::FixedBytes(b) | Token::Bytes(b) => {
            Value::String(format!("0x{}", hex::encode(b)))
        }
        Token::Bool(b) => Value::Bool(*b),
        Token::String(s) => Value::String(s.clone()),
        Token::Array(inner)
        | Token::FixedArray(inner)
        | Token::Tuple(inner) => {
            Value::Array(inner.iter().map(token_to_json).collect())
        }
    }
}

fn args_to_json(params: &[LogParam]) -> Map<String, Value> {
    params
        .iter()
        .map(|p| (p.name.clone(), token_to_json(&p.value)))
        .collect()
}

fn first_indexed_uint(
    event: &ethers::abi::Event,
    params: &[LogParam],
) -> Option<U256> {
    let first_indexed = event.inputs.iter().find(|input| input.indexed)?;
    params
        .iter()
        .find(|p| p.name == first_indexed.name)
        .and_then(|p| match &p.value {
            Token::Uint(u) => Some(*u),
            _ => None,
        })
}

fn find<'a>(
    params: &'a [LogParam],
    name: &str,
) -> Result<&'a Token, DecodeError> {
    params
        .iter()
        .find(|p| p.name == name)
        .map(|p| &p.value)
        .context(MalformedArgumentSnafu { name })
}

fn uint(params: &[LogParam], name: &str) -> Result<U256, DecodeError> {
    match find(params, name)? {
        Token::Uint(u) => Ok(*u),
        _ => MalformedArgumentSnafu { name }.fail(),
    }
}

fn uint_to_u64(value: U256, name: &str) -> Result<u64, DecodeError> {
    snafu::ensure!(value.bits() <= 64, MalformedArgumentSnafu { name });
    Ok(value.as_u64())
}

fn uint_u64(params: &[LogParam], name: &str) -> Result<u64, DecodeError> {
    uint_to_u64(uint(params, name)?, name)
}

fn uint_u128(params: &[LogParam], name: &str) -> Result<u128, DecodeError> {
    let value = uint(params, name)?;
    snafu::ensure!(value.bits() <= 128, MalformedArgumentSnafu { name });
    Ok(value.as_u128())
}

fn uint_u16(params: &[LogParam], name: &str) -> Result<u16, DecodeError> {
    let value = uint_u64(params, name)?;
    u16::try_from(value)
        .ok()
        .context(MalformedArgumentSnafu { name })
}

fn address(params: &[LogParam], name: &str) -> Result<Address, DecodeError> {
    match find(params, name)? {
        Token::Address(a) => Ok(*a),
        _ => MalformedArgumentSnafu { name }.fail(),
    }
}

fn bytes32(params: &[LogParam], name: &str) -> Result<H256, DecodeError> {
    match find(params, name)? {
        Token::FixedBytes(bytes) if bytes.len() == 32 => {
            Ok(H256::from_slice(bytes))
        }
        _ => MalformedArgumentSnafu { name }.fail(),
    }
}

fn boolean(params: &[LogParam], name: &str) -> Result<bool, DecodeError> {
    match find(params, name)? {
        Token::Bool(b) => Ok(*b),
        _ => MalformedArgumentSnafu { name }.fail(),
    }
}

fn string(params: &[LogParam], name: &str) -> Result<String, DecodeError> {
    match find(params, name)? {
        Token::String(s) => Ok(s.clone()),
        _ => MalformedArgumentSnafu { name }.fail(),
    }
}

fn optional_uint_u64(params: &[LogParam], name: &str) -> Option<u64> {
    params.iter().find(|p| p.name == name).and_then(|p| {
        match &p.value {
            Token::Uint(u) if u.bits() <= 64 => Some(u.as_u64()),
            _ => None,
        }
    })
}

fn typed_event(
    name: &str,
    params: &[LogParam],
) -> Result<EscrowEvent, DecodeError> {
    let event = match name {
        "TaskCreated" => EscrowEvent::TaskCreated {
            task_id: uint(params, "taskId")?,
            requester: address(params, "requester")?,
            payout_amount: uint_u128(params, "payoutAmount")?,
            max_winners: uint_u16(params, "maxWinners")?,
            deadline: uint_u64(params, "deadline")?,
            spec_hash: bytes32(params, "specHash")?,
        },
        "TaskFunded" => EscrowEvent::TaskFunded {
            task_id: uint(params, "taskId")?,
            requester: address(params, "requester")?,
            escrowed_amount: uint(params, "escrowedAmount")?,
            deposit_fee_paid: uint(params, "depositFeePaid")?,
        },
        "Claimed" => EscrowEvent::Claimed {
            task_id: uint(params, "taskId")?,
            submission_id: uint_u64(params, "submissionId")?,
            agent: address(params, "agent")?,
        },
        "ProofSubmitted" => EscrowEvent::ProofSubmitted {
            task_id: uint(params, "taskId")?,
            submission_id: uint_u64(params, "submissionId")?,
            agent: address(params, "agent")?,
            proof_hash: bytes32(params, "proofHash")?,
            submitted_at: optional_uint_u64(params, "submittedAt"),
        },
        "Approved" => EscrowEvent::Approved {
            task_id: uint(params, "taskId")?,
            submission_id: uint_u64(params, "submissionId")?,
            approver: address(params, "approver")?,
        },
        "Rejected" => EscrowEvent::Rejected {
            task_id: uint(params, "taskId")?,
            submission_id: uint_u64(params, "submissionId")?,
            approver: address(params, "approver")?,
        },
        "Withdrawn" => EscrowEvent::Withdrawn {
            task_id: uint(params, "taskId")?,
            submission_id: uint_u64(params, "submissionId")?,
            agent: address(params, "agent")?,
            net_payout: uint(params, "netPayout")?,
            recipient_fee: uint(params, "recipientFee")?,
        },
        "DisputeOpened" => EscrowEvent::DisputeOpened {
            task_id: uint(params, "taskId")?,
            submission_id: uint_u64(params, "submissionId")?,
            by: address(params, "by")?,
        },
        "DisputeResolved" => EscrowEvent::DisputeResolved {
            task_id: uint(params, "taskId")?,
            submission_id: uint_u64(params, "submissionId")?,
            by: address(params, "by")?,
            approved: boolean(params, "approved")?,
        },
        "TaskClosed" => EscrowEvent::TaskClosed {
            task_id: uint(params, "taskId")?,
            requester: address(params, "requester")?,
            refunded: uint(params, "refunded")?,
        },
        "TaskCancelled" => EscrowEvent::TaskCancelled {
            task_id: uint(params, "taskId")?,
            requester: address(params, "requester")?,
            refunded: uint(params, "refunded")?,
        },
        "TaskRefunded" => EscrowEvent::TaskRefunded {
            task_id: uint(params, "taskId")?,
            requester: address(params, "requester")?,
            refunded: uint(params, "refunded")?,
            reason: string(params, "reason")?,
        },
        _ => {
            return UnknownTopicSnafu { topic: None::<H256> }.fail();
        }
    };
    Ok(event)
}
