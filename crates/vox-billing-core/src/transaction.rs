//! Credit transaction types for vox-billing.
//!
//! Every balance change appends exactly one transaction. Records are
//! immutable once written; corrections are expressed as compensating
//! entries (refunds, adjustments, expirations), never edits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId};

/// A credit transaction representing a balance change.
///
/// Amounts are signed: positive entries add credits, negative entries
/// remove them. Transactions use ULIDs for time-ordered IDs.
///
/// Constructors leave `balance_after_credits` at zero; the storage layer
/// stamps the authoritative post-write balance while it holds the
/// account's write lock, so the recorded figure can never race a
/// concurrent mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Amount in credits. Positive = credit, negative = debit.
    pub amount_credits: i64,

    /// Type of transaction.
    pub transaction_type: TransactionType,

    /// Balance after this transaction was applied.
    pub balance_after_credits: i64,

    /// Human-readable description.
    pub description: String,

    /// Caller-supplied idempotency key, if the operation carried one.
    /// At most one transaction per user exists for a given key.
    pub request_id: Option<String>,

    /// External payment intent that funded this entry, for purchases.
    /// At most one transaction exists for a given intent.
    pub payment_intent_id: Option<String>,

    /// When the credits granted by this entry lapse, for purchases and
    /// grants. Debits carry no expiration.
    pub expiration_date: Option<DateTime<Utc>>,

    /// Additional context (service name, model, usage metadata).
    pub metadata: serde_json::Value,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a purchase transaction for settled payments.
    #[must_use]
    pub fn purchase(
        user_id: UserId,
        amount_credits: i64,
        payment_intent_id: String,
        expiration_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount_credits,
            transaction_type: TransactionType::Purchase,
            balance_after_credits: 0,
            description: format!("Purchased {amount_credits} credits"),
            request_id: None,
            payment_intent_id: Some(payment_intent_id),
            expiration_date: Some(expiration_date),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Create a consumption transaction (deduction for metered usage).
    #[must_use]
    pub fn consumption(
        user_id: UserId,
        amount_credits: i64,
        description: String,
        request_id: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount_credits: -amount_credits.abs(), // Always negative for consumption
            transaction_type: TransactionType::Consumption,
            balance_after_credits: 0,
            description,
            request_id,
            payment_intent_id: None,
            expiration_date: None,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Create a free monthly grant transaction.
    ///
    /// The `grant_key` doubles as the idempotency key, so granting twice
    /// for the same month is a no-op at the storage layer.
    #[must_use]
    pub fn free_grant(
        user_id: UserId,
        amount_credits: i64,
        grant_key: String,
        expiration_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount_credits,
            transaction_type: TransactionType::FreeGrant,
            balance_after_credits: 0,
            description: format!("Free monthly {amount_credits} credits"),
            request_id: Some(grant_key),
            payment_intent_id: None,
            expiration_date: Some(expiration_date),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Create a refund transaction.
    #[must_use]
    pub fn refund(
        user_id: UserId,
        amount_credits: i64,
        reason: String,
        request_id: Option<String>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount_credits,
            transaction_type: TransactionType::Refund,
            balance_after_credits: 0,
            description: reason,
            request_id,
            payment_intent_id: None,
            expiration_date: None,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Create an administrative adjustment transaction.
    #[must_use]
    pub fn admin_adjust(
        user_id: UserId,
        amount_credits: i64,
        reason: String,
        request_id: Option<String>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount_credits,
            transaction_type: TransactionType::AdminAdjust,
            balance_after_credits: 0,
            description: reason,
            request_id,
            payment_intent_id: None,
            expiration_date: None,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Create an expiration transaction realizing lapsed credits.
    #[must_use]
    pub fn expiration(user_id: UserId, amount_credits: i64) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount_credits: -amount_credits.abs(), // Always negative
            transaction_type: TransactionType::Expiration,
            balance_after_credits: 0,
            description: format!("Expired {} credits", amount_credits.abs()),
            request_id: None,
            payment_intent_id: None,
            expiration_date: None,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Set metadata on the transaction.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether the credits granted by this entry have lapsed as of `now`.
    ///
    /// Entries without an expiration date never expire.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|d| d <= now)
    }
}

/// Type of credit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// User purchased credits.
    Purchase,

    /// Credits deducted for STT/TTS usage.
    Consumption,

    /// Free monthly credit grant.
    FreeGrant,

    /// Refund issued.
    Refund,

    /// Manual administrative adjustment.
    AdminAdjust,

    /// Lapsed credits removed from the balance.
    Expiration,
}

impl TransactionType {
    /// Check if this transaction type adds credits (positive balance change).
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(
            self,
            Self::Purchase | Self::FreeGrant | Self::Refund | Self::AdminAdjust
        )
    }

    /// Check if this transaction type removes credits (negative balance change).
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Consumption | Self::Expiration)
    }
}
