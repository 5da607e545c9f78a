// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use clap::Parser;
use ethers::providers::{Http, Provider};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use escrow_api::{ApiCLIConfig, ApiConfig, ApiContext};
use escrow_data::{Repository, RepositoryCLIConfig, RepositoryConfig};
use escrow_events::{
    ClawedEscrow, EscrowDeployment, EscrowDeploymentCLIConfig,
};
use escrow_indexer::{
    new_status_handle, Engine, EngineOptions, EthersChain, IndexerCLIConfig,
    IndexerConfig,
};

#[derive(Parser)]
#[command(name = "escrow-node")]
struct CLIConfig {
    #[command(flatten)]
    deployment_config: EscrowDeploymentCLIConfig,

    #[command(flatten)]
    repository_config: RepositoryCLIConfig,

    #[command(flatten)]
    indexer_config: IndexerCLIConfig,

    #[command(flatten)]
    api_config: ApiCLIConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("starting clawed-escrow node");
    let cli_config = CLIConfig::parse();
    let deployment: EscrowDeployment = cli_config.deployment_config.into();
    let repository_config: RepositoryConfig =
        cli_config.repository_config.into();
    let indexer_config: IndexerConfig = cli_config.indexer_config.into();
    let api_config: ApiConfig = cli_config.api_config.into();

    info!("opening the store and applying pending migrations");
    let repository = {
        let config = repository_config.clone();
        let deployment = deployment.clone();
        tokio::task::spawn_blocking(move || {
            Repository::new(config, &deployment)
        })
        .await??
    };

    let status = new_status_handle();
    let chain = EthersChain::new(
        &indexer_config.chain_rpc_url,
        deployment.clone(),
        indexer_config.rpc_timeout,
    )?;
    let engine = Engine::new(
        chain,
        repository.clone(),
        deployment.clone(),
        EngineOptions::from(&indexer_config),
        status.clone(),
    );

    let view_provider =
        Provider::<Http>::try_from(indexer_config.chain_rpc_url.as_str())?;
    let escrow_view = Some(ClawedEscrow::new(
        deployment.contract_address,
        Arc::new(view_provider),
    ));
    let context = ApiContext::new(
        &api_config,
        repository.clone(),
        status.clone(),
        escrow_view,
    );
    let server = escrow_api::create(&api_config, context)?;
    info!(
        address = %api_config.listen_address,
        "api server bound; starting indexer loops"
    );

    if let Some(ws_url) = indexer_config.chain_rpc_ws_url.clone() {
        tokio::spawn(escrow_indexer::run_tail(
            ws_url,
            deployment.clone(),
            repository.clone(),
            status.clone(),
            indexer_config.poll_interval,
        ));
    }

    tokio::select! {
        result = escrow_indexer::run(engine, indexer_config.poll_interval) => {
            match result {
                Ok(_) => info!("indexer loop terminated"),
                Err(e) => error!("indexer loop terminated with error: {}", e),
            }
        },
        result = server => {
            match result {
                Ok(_) => info!("api server terminated"),
                Err(e) => error!("api server terminated with error: {}", e),
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        },
    }
    info!("clawed-escrow node stopped");
    Ok(())
}
