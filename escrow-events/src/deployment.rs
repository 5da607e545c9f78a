// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use clap::Parser;
use ethers::types::Address;

use crate::fmt::hex_address;

/// Identifies one escrow deployment. Every projection row is scoped by this
/// pair; two deployments never share state.
#[derive(Debug, Clone, PartialEq)]
pub struct EscrowDeployment {
    pub chain_id: u64,
    pub contract_address: Address,
}

impl EscrowDeployment {
    /// Canonical form used in persisted rows and API responses.
    pub fn contract_address_hex(&self) -> String {
        hex_address(&self.contract_address)
    }
}

#[derive(Debug, Clone, Parser)]
pub struct EscrowDeploymentCLIConfig {
    /// Chain id the contract is deployed on
    #[arg(long, env, default_value_t = 8453)]
    pub chain_id: u64,

    /// Address of the escrow contract to index
    #[arg(long, env)]
    pub escrow_contract_address: Address,
}

impl From<EscrowDeploymentCLIConfig> for EscrowDeployment {
    fn from(cli_config: EscrowDeploymentCLIConfig) -> Self {
        Self {
            chain_id: cli_config.chain_id,
            contract_address: cli_config.escrow_contract_address,
        }
    }
}
