// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError};
use ethers::types::Log;
use snafu::{ResultExt, Snafu};
use std::sync::Arc;
use std::time::Duration;

use escrow_events::{log_filter, EscrowDeployment};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChainSourceError {
    #[snafu(display("chain provider error"))]
    ProviderRequest { source: ProviderError },

    #[snafu(display("invalid chain rpc url: {}", message))]
    InvalidUrl { message: String },

    #[snafu(display("chain request timed out after {} ms", timeout_ms))]
    RequestTimeout { timeout_ms: u64 },
}

/// What the indexer needs from an EVM node. The engine only talks to this
/// trait, which keeps its tests deterministic.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn block_number(&self) -> Result<u64, ChainSourceError>;

    /// Logs of the escrow contract in `[from, to]`, in chain order.
    async fn logs(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<Log>, ChainSourceError>;
}

/// JSON-RPC implementation with a per-request deadline.
pub struct EthersChain {
    provider: Arc<Provider<Http>>,
    deployment: EscrowDeployment,
    timeout: Duration,
}

impl EthersChain {
    pub fn new(
        rpc_url: &str,
        deployment: EscrowDeployment,
        timeout: Duration,
    ) -> Result<Self, ChainSourceError> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(|e| {
            ChainSourceError::InvalidUrl {
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            provider: Arc::new(provider),
            deployment,
            timeout,
        })
    }

    async fn deadline<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ChainSourceError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ChainSourceError::RequestTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })?
            .context(ProviderRequestSnafu)
    }
}

#[async_trait]
impl ChainSource for EthersChain {
    async fn block_number(&self) -> Result<u64, ChainSourceError> {
        let number = self.deadline(self.provider.get_block_number()).await?;
        Ok(number.as_u64())
    }

    async fn logs(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<Log>, ChainSourceError> {
        let filter = log_filter(self.deployment.contract_address)
            .from_block(from)
            .to_block(to);
        self.deadline(self.provider.get_logs(&filter)).await
    }
}
