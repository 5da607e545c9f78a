// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::{middleware, web, App, HttpServer};
use ethers::providers::{Http, Provider};
use std::sync::Arc;

use escrow_data::Repository;
use escrow_events::ClawedEscrow;
use escrow_indexer::StatusHandle;

use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use crate::rate_limit::RateLimiter;
use crate::routes;

/// Everything a handler needs; cloned into each worker.
#[derive(Clone)]
pub struct ApiContext {
    pub repository: Repository,
    pub status: StatusHandle,
    pub auth: AuthConfig,
    pub limiter: Arc<RateLimiter>,
    pub escrow_view: Option<ClawedEscrow<Provider<Http>>>,
    pub submissions_cap: i64,
}

impl ApiContext {
    pub fn new(
        config: &ApiConfig,
        repository: Repository,
        status: StatusHandle,
        escrow_view: Option<ClawedEscrow<Provider<Http>>>,
    ) -> Self {
        Self {
            repository,
            status,
            auth: config.auth.clone(),
            limiter: Arc::new(RateLimiter::new(
                config.rate_limit_window,
                config.rate_limit_max,
                config.trust_proxy,
            )),
            escrow_view,
            submissions_cap: config.submissions_cap,
        }
    }
}

pub fn create(
    config: &ApiConfig,
    context: ApiContext,
) -> std::io::Result<Server> {
    let server = HttpServer::new(move || {
        let cors = Cors::permissive();
        App::new()
            .app_data(web::Data::new(context.clone()))
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .configure(routes::configure)
    })
    .bind(config.listen_address.clone())?
    .run();
    Ok(server)
}
