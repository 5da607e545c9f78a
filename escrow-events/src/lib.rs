// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod abi;
mod contract;
mod decode;
mod deployment;
mod events;
mod fmt;

pub use abi::{event_signatures, log_filter, EVENT_NAMES};
pub use contract::ClawedEscrow;
pub use decode::{decode_log, DecodeError, DecodedLog, LogProvenance};
pub use deployment::{EscrowDeployment, EscrowDeploymentCLIConfig};
pub use events::EscrowEvent;
pub use fmt::{decimal, hex_address, hex_hash};
