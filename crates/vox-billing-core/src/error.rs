//! Error types for vox-billing.

use crate::ids::IdError;

/// Result type for vox-billing operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in vox-billing operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Insufficient credits for the operation.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance in credits.
        balance: i64,
        /// Required amount in credits.
        required: i64,
    },

    /// The requested amount is zero, negative, or otherwise unusable.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A request field failed validation before any storage access.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Account not found.
    #[error("account not found: {user_id}")]
    AccountNotFound {
        /// The user ID that was not found.
        user_id: String,
    },

    /// Account already exists.
    #[error("account already exists: {user_id}")]
    AccountAlreadyExists {
        /// The user ID that already exists.
        user_id: String,
    },

    /// Transaction not found.
    #[error("transaction not found: {transaction_id}")]
    TransactionNotFound {
        /// The transaction ID that was not found.
        transaction_id: String,
    },

    /// Invoice not found.
    #[error("invoice not found: {invoice_id}")]
    InvoiceNotFound {
        /// The invoice ID that was not found.
        invoice_id: String,
    },

    /// Unknown credit package identifier.
    #[error("unknown credit package: {package_id}")]
    UnknownPackage {
        /// The package ID that was not found in the catalog.
        package_id: String,
    },

    /// The external payment has not reached the `succeeded` state.
    #[error("payment not completed: status={status}")]
    PaymentNotCompleted {
        /// The payment status reported by the provider.
        status: String,
    },

    /// The external payment's recorded metadata does not match the purchase
    /// being confirmed. Callers see only a generic failure; the mismatch
    /// detail stays in server logs.
    #[error("payment verification failed")]
    PaymentMismatch {
        /// What did not match, for logging. Never serialized to callers.
        reason: String,
    },

    /// The payment provider could not be reached or returned garbage.
    #[error("payment provider error: {0}")]
    PaymentProvider(String),

    /// Storage returned corrupt or undecodable data.
    #[error("storage error: {0}")]
    Storage(String),

    /// The ledger's storage backend kept failing after internal retries.
    #[error("ledger unavailable after {attempts} attempts")]
    Unavailable {
        /// How many attempts were made before giving up.
        attempts: u32,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl LedgerError {
    /// Stable machine-readable code for this error, used in API envelopes
    /// and client-side matching.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::Validation(_) => "invalid_request",
            Self::AccountNotFound { .. } => "account_not_found",
            Self::AccountAlreadyExists { .. } => "account_exists",
            Self::TransactionNotFound { .. } => "transaction_not_found",
            Self::InvoiceNotFound { .. } => "invoice_not_found",
            Self::UnknownPackage { .. } => "unknown_package",
            Self::PaymentNotCompleted { .. } => "payment_not_completed",
            Self::PaymentMismatch { .. } => "payment_verification_failed",
            Self::PaymentProvider(_) => "payment_provider_error",
            Self::Storage(_) => "storage_error",
            Self::Unavailable { .. } => "ledger_unavailable",
            Self::InvalidId(_) => "invalid_id",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_display_hides_reason() {
        let err = LedgerError::PaymentMismatch {
            reason: "credits: expected 10000, got 999999".into(),
        };
        let shown = err.to_string();
        assert_eq!(shown, "payment verification failed");
        assert!(!shown.contains("expected"));
    }

    #[test]
    fn insufficient_credits_display() {
        let err = LedgerError::InsufficientCredits {
            balance: 5,
            required: 10,
        };
        assert_eq!(
            err.to_string(),
            "insufficient credits: balance=5, required=10"
        );
    }
}
