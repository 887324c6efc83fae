//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in
//! column families. Fixed-width binary prefixes (16-byte UUID/ULID) keep
//! per-user ranges contiguous, and ULID suffixes keep them time-ordered.

use vox_billing_core::{InvoiceId, TransactionId, UserId};

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-transaction index key.
///
/// Format: `user_id (16 bytes) || transaction_id (16 bytes)`
///
/// Since ULIDs are time-ordered, transactions for a user sort by time.
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating all transactions for a user.
#[must_use]
pub fn user_transactions_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Upper bound for reverse iteration over a user's index range.
///
/// No real index key can equal this (ULID timestamps stay well below
/// `0xFFFF…` for the next few millennia), so a reverse seek from here
/// lands on the user's newest entry.
#[must_use]
pub fn user_range_end(user_id: &UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&[0xFF; 16]);
    key
}

/// Extract the transaction ID from a user-transaction index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_transaction_id_from_user_key(key: &[u8]) -> TransactionId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    TransactionId::from_bytes(bytes).expect("valid ULID bytes")
}

/// Create a consumption idempotency key.
///
/// Format: `user_id (16 bytes) || request_id (UTF-8)`
///
/// Scoping by user means two users may reuse the same request ID without
/// colliding.
#[must_use]
pub fn request_key(user_id: &UserId, request_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + request_id.len());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(request_id.as_bytes());
    key
}

/// Create a payment-intent dedup key.
#[must_use]
pub fn payment_intent_key(payment_intent_id: &str) -> Vec<u8> {
    payment_intent_id.as_bytes().to_vec()
}

/// Create an invoice key from an invoice ID.
#[must_use]
pub fn invoice_key(invoice_id: &InvoiceId) -> Vec<u8> {
    invoice_id.to_bytes().to_vec()
}

/// Create a user-invoice index key.
///
/// Format: `user_id (16 bytes) || invoice_id (16 bytes)`
#[must_use]
pub fn user_invoice_key(user_id: &UserId, invoice_id: &InvoiceId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&invoice_id.to_bytes());
    key
}

/// Create a prefix for iterating all invoices for a user.
#[must_use]
pub fn user_invoices_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the invoice ID from a user-invoice index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_invoice_id_from_user_key(key: &[u8]) -> InvoiceId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    InvoiceId::from_bytes(bytes).expect("valid ULID bytes")
}
