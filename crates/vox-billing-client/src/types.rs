//! Request and response types for the vox-billing client.

use serde::{Deserialize, Serialize};

use vox_billing_core::{Modality, TransactionType};

/// Metered usage charge: estimate the cost of completed usage and deduct it.
#[derive(Debug, Clone, Serialize)]
pub struct ChargeUsage {
    /// User ID being charged.
    pub user_id: String,
    /// Which model family was used.
    pub modality: Modality,
    /// Characters synthesized for TTS, seconds of audio for STT.
    pub input_size: f64,
    /// Unique request ID for idempotency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Extra key/value pairs recorded with the charge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<std::collections::BTreeMap<String, String>>,
}

/// Direct consumption of a pre-computed credit amount.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumeCredits {
    /// User ID being charged.
    pub user_id: String,
    /// Whole credits to deduct.
    pub amount_credits: i64,
    /// What the deduction was for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unique request ID for idempotency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Additional metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Estimate request body.
#[derive(Debug, Clone, Serialize)]
pub struct EstimateBody {
    /// Which model family to price.
    pub modality: Modality,
    /// Characters for TTS, seconds for STT.
    pub input_size: f64,
}

/// Estimate response from the API.
#[derive(Debug, Clone, Deserialize)]
pub struct EstimateResponse {
    /// The modality that was priced.
    pub modality: Modality,
    /// The input size that was priced.
    pub input_size: f64,
    /// Whole credits the usage would cost.
    pub credits: i64,
}

/// Charge response from the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeResponse {
    /// Transaction ID of the deduction.
    pub transaction_id: String,
    /// Whole credits deducted.
    pub credits: i64,
    /// New balance after deduction.
    pub balance_credits: i64,
    /// Whether an earlier request already applied this charge.
    pub replayed: bool,
}

/// Consumption response from the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumeResponse {
    /// Transaction ID of the deduction.
    pub transaction_id: String,
    /// Whole credits deducted.
    pub amount_credits: i64,
    /// New balance after deduction.
    pub balance_credits: i64,
    /// Whether an earlier request already applied this deduction.
    pub replayed: bool,
}

/// Balance response.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    /// Balance in whole credits.
    pub balance_credits: i64,
}

/// One transaction in a history page.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRecord {
    /// Transaction ID.
    pub id: String,
    /// Amount in credits (positive = credit, negative = debit).
    pub amount_credits: i64,
    /// Transaction type.
    pub transaction_type: TransactionType,
    /// Balance after this transaction.
    pub balance_after_credits: i64,
    /// Description.
    pub description: String,
    /// When the granted credits lapse, for credit entries.
    pub expiration_date: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

/// One page of transaction history.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionsPage {
    /// Transactions on this page (newest first).
    pub transactions: Vec<TransactionRecord>,
    /// Total entries across all pages.
    pub total: u64,
    /// Total number of pages at this limit.
    pub pages: u64,
    /// The 1-based page this response covers.
    pub current: u32,
}

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    pub details: Option<serde_json::Value>,
}
