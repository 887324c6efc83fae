//! `RocksDB` storage layer for vox-billing.
//!
//! This crate provides persistent storage for accounts, transactions, and
//! invoices using `RocksDB` with column families for efficient indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `accounts`: Primary account records, keyed by `user_id`
//! - `transactions`: Credit transactions, keyed by `transaction_id` (ULID)
//! - `transactions_by_user`: Index for listing transactions by user
//! - `request_keys`: Consumption idempotency, keyed by `user_id || request_id`
//! - `payment_intents`: Purchase dedup, keyed by `payment_intent_id`
//! - `invoices`: Invoice records, keyed by `invoice_id` (ULID)
//! - `invoices_by_user`: Index for listing invoices by user
//! - `invoice_intents`: Invoice uniqueness, keyed by `payment_intent_id`
//!
//! # Atomicity
//!
//! Balance mutations go through the compound operations (`apply_debit`,
//! `apply_credit`, `settle_purchase`), which write the account counter,
//! the transaction record, its index entry, and any idempotency keys in
//! one `WriteBatch`. Compound operations serialize per user, so two
//! concurrent debits cannot both pass the balance check and overdraw.
//!
//! # Example
//!
//! ```no_run
//! use vox_billing_store::{RocksStore, Store};
//! use vox_billing_core::{Account, UserId};
//!
//! let store = RocksStore::open("/tmp/vox-billing-db").unwrap();
//!
//! let user_id = UserId::generate();
//! store.create_account(&Account::new(user_id)).unwrap();
//! let account = store.get_account(&user_id).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use vox_billing_core::{Account, Invoice, InvoiceId, Transaction, TransactionId, UserId};

/// Result of a debit compound operation.
#[derive(Debug, Clone)]
pub struct DebitOutcome {
    /// The transaction on record for this debit. On replay this is the
    /// previously written record, not a new one.
    pub transaction: Transaction,

    /// Balance after the recorded debit.
    pub new_balance_credits: i64,

    /// True if an idempotency key matched and nothing was written.
    pub replayed: bool,
}

/// Result of a credit compound operation.
#[derive(Debug, Clone)]
pub struct CreditOutcome {
    /// The transaction on record for this credit. On replay this is the
    /// previously written record, not a new one.
    pub transaction: Transaction,

    /// Balance after the recorded credit.
    pub new_balance_credits: i64,

    /// True if an idempotency key matched and nothing was written.
    pub replayed: bool,
}

/// Result of a purchase settlement compound operation.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    /// The purchase transaction on record for the payment intent.
    pub transaction: Transaction,

    /// The invoice on record for the payment intent.
    pub invoice: Invoice,

    /// Balance after the recorded purchase.
    pub new_balance_credits: i64,

    /// True if the intent was already settled and nothing was written.
    pub replayed: bool,
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer so the ledger can be driven
/// against different implementations (production `RocksDB`, wrappers that
/// inject failures in tests).
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Create an account record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the user already has an
    /// account, or an error if the database operation fails.
    fn create_account(&self, account: &Account) -> Result<()>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>>;

    /// List transactions for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>>;

    /// Count all transactions for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_transactions_by_user(&self, user_id: &UserId) -> Result<u64>;

    /// Sum the amounts of all transactions for a user whose credits have
    /// not expired as of `as_of`.
    ///
    /// This is the audit aggregation: while no granted credits have
    /// lapsed, the sum equals the denormalized account balance exactly.
    /// Consumption debits always count. Expired credit lots are skipped,
    /// and so are the EXPIRATION debits that realize them, so a realized
    /// lapse cancels out instead of counting twice.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn sum_unexpired_credits(&self, user_id: &UserId, as_of: DateTime<Utc>) -> Result<i64>;

    /// Look up the transaction recorded for a consumption idempotency key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_transaction_by_request(
        &self,
        user_id: &UserId,
        request_id: &str,
    ) -> Result<Option<Transaction>>;

    /// Look up the transaction recorded for a payment intent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_transaction_by_intent(&self, payment_intent_id: &str) -> Result<Option<Transaction>>;

    // =========================================================================
    // Invoice Operations
    // =========================================================================

    /// Get an invoice by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_invoice(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>>;

    /// List invoices for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_invoices_by_user(&self, user_id: &UserId) -> Result<Vec<Invoice>>;

    /// Look up the invoice issued for a payment intent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_invoice_by_intent(&self, payment_intent_id: &str) -> Result<Option<Invoice>>;

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Apply a debit: check balance, subtract, and append the transaction
    /// atomically. The transaction's amount must be negative, as produced
    /// by the debit constructors; its `balance_after_credits` is stamped
    /// here under the account lock.
    ///
    /// If the transaction carries a `request_id` that was already applied
    /// for this user, nothing is written and the prior record is returned
    /// with `replayed = true`.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientCredits` if the balance is too low; the
    ///   account is untouched.
    fn apply_debit(&self, transaction: Transaction) -> Result<DebitOutcome>;

    /// Apply a credit: add to the balance and append the transaction
    /// atomically. The transaction's amount must be positive;
    /// `balance_after_credits` is stamped here under the account lock.
    ///
    /// Replay detection: a matching `request_id` (per user) or
    /// `payment_intent_id` (global) short-circuits to the prior record
    /// with `replayed = true` and writes nothing.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn apply_credit(&self, transaction: Transaction) -> Result<CreditOutcome>;

    /// Settle a purchase: credit the balance, append the purchase
    /// transaction, and mint the invoice in one atomic write. The
    /// transaction and invoice must carry the same payment intent.
    ///
    /// If the intent was already settled, nothing is written and the
    /// prior transaction and invoice are returned with `replayed = true`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn settle_purchase(&self, transaction: Transaction, invoice: Invoice)
        -> Result<SettlementOutcome>;
}
