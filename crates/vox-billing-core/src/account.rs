//! Account types for vox-billing.
//!
//! An account is the denormalized view of a user's credit position. The
//! transaction log is the source of truth; the account row exists so that
//! balance checks are a point read instead of an aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A credit account for a user.
///
/// Balances are whole credits stored as `i64`. All mutation goes through the
/// storage layer's compound operations, which update these counters and
/// append the matching transaction in one atomic write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// The user this account belongs to.
    pub user_id: UserId,

    /// Current credit balance. Never negative.
    pub balance_credits: i64,

    /// Lifetime credits purchased.
    pub lifetime_purchased_credits: i64,

    /// Lifetime credits granted (free monthly grants, refunds, adjustments).
    pub lifetime_granted_credits: i64,

    /// Lifetime credits consumed by usage.
    pub lifetime_used_credits: i64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance_credits: 0,
            lifetime_purchased_credits: 0,
            lifetime_granted_credits: 0,
            lifetime_used_credits: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account has sufficient credits for a deduction.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount_credits: i64) -> bool {
        self.balance_credits >= amount_credits
    }
}
