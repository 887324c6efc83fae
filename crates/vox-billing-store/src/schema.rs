//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Credit transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Consumption idempotency keys, keyed by `user_id || request_id`.
    /// Value is the 16-byte transaction ID the key resolved to.
    pub const REQUEST_KEYS: &str = "request_keys";

    /// Purchase dedup keys, keyed by `payment_intent_id`.
    /// Value is the 16-byte transaction ID minted for the intent.
    pub const PAYMENT_INTENTS: &str = "payment_intents";

    /// Invoice records, keyed by `invoice_id` (ULID).
    pub const INVOICES: &str = "invoices";

    /// Index: invoices by user, keyed by `user_id || invoice_id`.
    /// Value is empty (index only).
    pub const INVOICES_BY_USER: &str = "invoices_by_user";

    /// Invoice uniqueness keys, keyed by `payment_intent_id`.
    /// Value is the 16-byte invoice ID issued for the intent.
    pub const INVOICE_INTENTS: &str = "invoice_intents";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::REQUEST_KEYS,
        cf::PAYMENT_INTENTS,
        cf::INVOICES,
        cf::INVOICES_BY_USER,
        cf::INVOICE_INTENTS,
    ]
}
