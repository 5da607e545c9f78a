// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use snafu::Snafu;

/// Every non-2xx response is one of these; clients always receive
/// `{ "error": code, "message"?, "details"? }` and nothing else.
#[derive(Debug, Snafu)]
pub enum ApiError {
    #[snafu(display("{}", message))]
    Unauthorized {
        code: &'static str,
        message: String,
    },

    #[snafu(display("{}", message))]
    Forbidden {
        code: &'static str,
        message: String,
    },

    #[snafu(display("{}", message))]
    NotFound { message: String },

    #[snafu(display("{}", message))]
    Conflict {
        code: &'static str,
        message: String,
    },

    #[snafu(display("{}", message))]
    Validation { message: String },

    #[snafu(display("rate limit exceeded"))]
    RateLimited { retry_after_secs: u64 },

    #[snafu(display("{}", message))]
    ChainUnavailable { message: String },

    #[snafu(display("internal error"))]
    Internal { message: String },
}

impl ApiError {
    pub fn unauthorized(
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        ApiError::Unauthorized {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound {
            message: message.into(),
        }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal {
            message: message.into(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized { code, .. }
            | ApiError::Forbidden { code, .. }
            | ApiError::Conflict { code, .. } => code,
            ApiError::NotFound { .. } => "not_found",
            ApiError::Validation { .. } => "validation_error",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::ChainUnavailable { .. } => "chain_unavailable",
            ApiError::Internal { .. } => "internal_error",
        }
    }
}

impl From<escrow_data::Error> for ApiError {
    fn from(source: escrow_data::Error) -> Self {
        // Store details stay in the log, never in a response body.
        tracing::error!(error = %source, "store failure while serving a request");
        ApiError::Internal {
            message: source.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ChainUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        if let ApiError::RateLimited { retry_after_secs } = self {
            body["details"] = json!({ "retryAfter": retry_after_secs });
        }
        let mut builder = HttpResponse::build(self.status_code());
        if let ApiError::RateLimited { retry_after_secs } = self {
            builder.insert_header((
                "Retry-After",
                retry_after_secs.to_string(),
            ));
        }
        builder.json(body)
    }
}
