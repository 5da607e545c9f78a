// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use clap::Parser;
use std::time::Duration;

use crate::auth::AuthConfig;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub listen_address: String,
    pub auth: AuthConfig,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    pub trust_proxy: bool,
    pub submissions_cap: i64,
}

#[derive(Debug, Clone, Parser)]
pub struct ApiCLIConfig {
    /// HTTP listen address of the API server
    #[arg(long, env, default_value = "0.0.0.0:8080")]
    api_listen_address: String,

    /// Accepted clock skew for signed requests, in milliseconds
    #[arg(long, env, default_value_t = 120_000)]
    signature_window_ms: i64,

    /// Replay-protection TTL for nonces, in milliseconds
    #[arg(long, env, default_value_t = 300_000)]
    nonce_ttl_ms: i64,

    /// Rate limit window, in milliseconds
    #[arg(long, env, default_value_t = 60_000)]
    rate_limit_window_ms: u64,

    /// Max requests per IP inside one window
    #[arg(long, env, default_value_t = 100)]
    rate_limit_max: usize,

    /// Honor X-Forwarded-For (only behind a trusted proxy)
    #[arg(long, env, default_value_t = false)]
    trust_proxy: bool,

    /// Row cap of the submissions listing
    #[arg(long, env, default_value_t = 500)]
    submissions_cap: i64,
}

impl From<ApiCLIConfig> for ApiConfig {
    fn from(cli_config: ApiCLIConfig) -> Self {
        Self {
            listen_address: cli_config.api_listen_address,
            auth: AuthConfig {
                signature_window_ms: cli_config.signature_window_ms,
                nonce_ttl_ms: cli_config.nonce_ttl_ms,
            },
            rate_limit_window: Duration::from_millis(
                cli_config.rate_limit_window_ms,
            ),
            rate_limit_max: cli_config.rate_limit_max,
            trust_proxy: cli_config.trust_proxy,
            submissions_cap: cli_config.submissions_cap,
        }
    }
}
