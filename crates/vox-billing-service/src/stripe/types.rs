//! Stripe API types.
//!
//! Only the fields this service reads are modeled; Stripe objects carry
//! far more, and serde ignores the rest.

use std::collections::HashMap;

use serde::Deserialize;

/// A Stripe payment intent.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    /// Intent ID (`pi_...`).
    pub id: String,

    /// Intent status (`succeeded`, `requires_payment_method`, ...).
    pub status: String,

    /// Amount in minor units.
    pub amount: i64,

    /// Lowercase ISO 4217 currency.
    pub currency: String,

    /// Secret the frontend uses to collect the payment.
    pub client_secret: Option<String>,

    /// Key/value metadata recorded at creation.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Stripe error response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// The error details.
    pub error: StripeErrorBody,
}

/// Stripe error details.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorBody {
    /// Error type (`invalid_request_error`, `api_error`, ...).
    #[serde(rename = "type")]
    pub error_type: String,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,

    /// Machine-readable code, when present.
    pub code: Option<String>,
}
