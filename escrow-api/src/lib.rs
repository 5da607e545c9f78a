// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod auth;
mod config;
mod error;
mod rate_limit;
mod routes;
mod server;

pub use auth::{
    authenticate, body_sha256_hex, canonical_message, require_wallet,
    AuthConfig, AUTH_DOMAIN,
};
pub use config::{ApiCLIConfig, ApiConfig};
pub use error::ApiError;
pub use rate_limit::RateLimiter;
pub use routes::configure;
pub use server::{create, ApiContext};
