// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use snafu::Snafu;

use crate::chain::ChainSourceError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IndexerError {
    #[snafu(display("chain source error"))]
    ChainError { source: ChainSourceError },

    #[snafu(display("repository error"))]
    RepositoryError { source: escrow_data::Error },

    #[snafu(display("websocket connection error"))]
    WsConnectError {
        source: ethers::providers::ProviderError,
    },

    #[snafu(display("log subscription error"))]
    SubscribeError {
        source: ethers::providers::ProviderError,
    },

    #[snafu(display("join error"))]
    JoinError { source: tokio::task::JoinError },
}
