//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use vox_billing_core::LedgerError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Bad request - invalid input before it reaches the ledger.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Too many requests in the current window.
    #[error("rate limit exceeded")]
    TooManyRequests {
        /// Seconds until the window resets.
        retry_after_seconds: u64,
    },

    /// The payment gateway failed or is not configured.
    #[error("payment provider error: {0}")]
    Gateway(String),

    /// An error surfaced by the ledger, settlement, or storage layers.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::TooManyRequests {
                retry_after_seconds,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many requests".to_string(),
                Some(serde_json::json!({ "retry_after_seconds": retry_after_seconds })),
            ),
            Self::Gateway(msg) => (
                StatusCode::BAD_GATEWAY,
                "payment_provider_error",
                msg.clone(),
                None,
            ),
            Self::Ledger(err) => {
                let status = ledger_status(err);
                let details = match err {
                    LedgerError::InsufficientCredits { balance, required } => {
                        Some(serde_json::json!({ "balance": balance, "required": required }))
                    }
                    _ => None,
                };
                let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %err, "Internal server error");
                    "An internal error occurred".to_string()
                } else {
                    err.to_string()
                };
                (status, err.code(), message, details)
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// HTTP status for each ledger error.
fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
        LedgerError::InvalidAmount(_)
        | LedgerError::Validation(_)
        | LedgerError::UnknownPackage { .. }
        | LedgerError::PaymentNotCompleted { .. }
        | LedgerError::PaymentMismatch { .. }
        | LedgerError::InvalidId(_) => StatusCode::BAD_REQUEST,
        LedgerError::AccountNotFound { .. }
        | LedgerError::TransactionNotFound { .. }
        | LedgerError::InvoiceNotFound { .. } => StatusCode::NOT_FOUND,
        LedgerError::AccountAlreadyExists { .. } => StatusCode::CONFLICT,
        LedgerError::PaymentProvider(_) => StatusCode::BAD_GATEWAY,
        LedgerError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn insufficient_credits_maps_to_payment_required() {
        let err = ApiError::from(LedgerError::InsufficientCredits {
            balance: 5,
            required: 10,
        });
        assert_eq!(status_of(err), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn validation_maps_to_bad_request() {
        let err = ApiError::from(LedgerError::Validation("invalid page or limit".into()));
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_account_maps_to_not_found() {
        let err = ApiError::from(LedgerError::AccountNotFound {
            user_id: "u".into(),
        });
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);
    }

    #[test]
    fn existing_account_maps_to_conflict() {
        let err = ApiError::from(LedgerError::AccountAlreadyExists {
            user_id: "u".into(),
        });
        assert_eq!(status_of(err), StatusCode::CONFLICT);
    }

    #[test]
    fn provider_failure_maps_to_bad_gateway() {
        let err = ApiError::from(LedgerError::PaymentProvider("unreachable".into()));
        assert_eq!(status_of(err), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn exhausted_retries_map_to_service_unavailable() {
        let err = ApiError::from(LedgerError::Unavailable { attempts: 3 });
        assert_eq!(status_of(err), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn storage_errors_are_not_echoed_to_callers() {
        let response = ApiError::from(LedgerError::Storage("rocksdb: io error".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = ApiError::TooManyRequests {
            retry_after_seconds: 12,
        };
        assert_eq!(status_of(err), StatusCode::TOO_MANY_REQUESTS);
    }
}
