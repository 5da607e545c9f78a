// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Wallet-signature request authentication. A wallet authorizes one HTTP
//! request by signing a canonical envelope; there are no sessions. Replay is
//! blocked by a persisted nonce with a TTL, clock drift is bounded by a skew
//! window.

use actix_web::HttpRequest;
use ethers::types::{Address, Signature};
use sha2::{Digest, Sha256};
use std::str::FromStr;

use escrow_data::Repository;
use escrow_events::hex_address;

use crate::error::ApiError;

pub const AUTH_DOMAIN: &str = "ClawedEscrow";

const WALLET_HEADER: &str = "wallet-address";
const SIGNATURE_HEADER: &str = "signature";
const TIMESTAMP_HEADER: &str = "timestamp";
const NONCE_HEADER: &str = "nonce";

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub signature_window_ms: i64,
    pub nonce_ttl_ms: i64,
}

/// The byte-exact string the wallet signs with `personal_sign`.
pub fn canonical_message(
    method: &str,
    path: &str,
    timestamp: &str,
    nonce: &str,
    body: &[u8],
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        AUTH_DOMAIN,
        method,
        path,
        timestamp,
        nonce,
        body_sha256_hex(body)
    )
}

/// Lowercase hex SHA-256 of the request body; an absent body hashes as the
/// empty JSON object.
pub fn body_sha256_hex(body: &[u8]) -> String {
    let effective: &[u8] = if body.is_empty() { b"{}" } else { body };
    hex::encode(Sha256::digest(effective))
}

/// Verifies the request envelope. Returns the authenticated wallet in
/// canonical lowercase hex, or `None` when no auth headers are present at
/// all (anonymous pass-through).
pub async fn authenticate(
    repository: &Repository,
    config: &AuthConfig,
    req: &HttpRequest,
    body: &[u8],
) -> Result<Option<String>, ApiError> {
    let wallet = header(req, WALLET_HEADER);
    let signature = header(req, SIGNATURE_HEADER);
    let timestamp = header(req, TIMESTAMP_HEADER);
    let nonce = header(req, NONCE_HEADER);

    let (wallet, signature, timestamp, nonce) =
        match (wallet, signature, timestamp, nonce) {
            (None, None, None, None) => return Ok(None),
            (Some(w), Some(s), Some(t), Some(n)) => (w, s, t, n),
            _ => {
                return Err(ApiError::unauthorized(
                    "missing_auth_headers",
                    "all of wallet-address, signature, timestamp and nonce \
                     are required",
                ))
            }
        };

    let claimed = Address::from_str(&wallet).map_err(|_| {
        ApiError::unauthorized(
            "invalid_wallet_address",
            "wallet-address is not a valid EVM address",
        )
    })?;

    let timestamp_ms: i64 = timestamp.parse().map_err(|_| {
        ApiError::unauthorized(
            "invalid_timestamp",
            "timestamp must be milliseconds since epoch",
        )
    })?;
    let now_ms = chrono::Utc::now().timestamp_millis();
    if (now_ms - timestamp_ms).abs() > config.signature_window_ms {
        return Err(ApiError::unauthorized(
            "timestamp_out_of_range",
            "request timestamp is outside the accepted window",
        ));
    }

    let signature = Signature::from_str(signature.trim_start_matches("0x"))
        .map_err(|_| {
            ApiError::unauthorized(
                "invalid_signature",
                "signature is not a 65-byte ECDSA signature",
            )
        })?;

    let message = canonical_message(
        req.method().as_str(),
        req.path(),
        &timestamp,
        &nonce,
        body,
    );
    let recovered = signature.recover(message.as_str()).map_err(|_| {
        ApiError::unauthorized(
            "invalid_signature",
            "signature does not verify",
        )
    })?;
    if recovered != claimed {
        return Err(ApiError::unauthorized(
            "signature_mismatch",
            "signature was not produced by wallet-address",
        ));
    }

    let fresh = {
        let repository = repository.clone();
        let nonce = nonce.clone();
        let ttl = config.nonce_ttl_ms;
        tokio::task::spawn_blocking(move || {
            repository.try_use_nonce(&nonce, now_ms, ttl)
        })
        .await
        .map_err(|_| ApiError::internal("nonce check task failed"))??
    };
    if !fresh {
        return Err(ApiError::unauthorized(
            "nonce_already_used",
            "nonce was already used",
        ));
    }

    Ok(Some(hex_address(&recovered)))
}

/// 401 unless `authenticate` produced a wallet.
pub fn require_wallet(wallet: Option<String>) -> Result<String, ApiError> {
    wallet.ok_or_else(|| {
        ApiError::unauthorized(
            "authentication_required",
            "this endpoint requires a signed request",
        )
    })
}

fn header(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_hashes_as_empty_object() {
        assert_eq!(body_sha256_hex(b""), body_sha256_hex(b"{}"));
        assert_ne!(body_sha256_hex(b""), body_sha256_hex(b"[]"));
    }

    #[test]
    fn canonical_message_is_byte_exact() {
        let message = canonical_message(
            "POST",
            "/tasks/7/metadata",
            "1700000000000",
            "nonce-1",
            b"{}",
        );
        let body_hash = body_sha256_hex(b"{}");
        assert_eq!(
            message,
            format!(
                "ClawedEscrow\nPOST\n/tasks/7/metadata\n1700000000000\nnonce-1\n{}",
                body_hash
            )
        );
    }
}
