//! Core types and utilities for vox-billing.
//!
//! This crate provides the foundational types used throughout the
//! vox-billing platform:
//!
//! - **Identifiers**: `UserId`, `TransactionId`, `InvoiceId`
//! - **Accounts**: `Account`
//! - **Transactions**: `Transaction`, `TransactionType`
//! - **Purchases**: `CreditPackage`, `Invoice`, VAT helpers
//! - **Pricing**: `Modality`, `PricingConfig`
//!
//! # Credit Unit
//!
//! Credits are whole numbers stored as `i64`. Usage prices are fractional
//! per unit (characters or seconds), but every charge is rounded up to a
//! whole credit at estimation time, so balances and transaction amounts
//! never carry fractions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod config;
pub mod error;
pub mod ids;
pub mod invoice;
pub mod package;
pub mod pricing;
pub mod transaction;
pub mod vat;

pub use account::Account;
pub use config::{
    LedgerConfig, DEFAULT_CREDITS_EXPIRATION_YEARS, DEFAULT_FREE_MONTHLY_CREDITS,
    DEFAULT_MAX_TRANSACTIONS_PER_PAGE,
};
pub use error::{LedgerError, Result};
pub use ids::{IdError, InvoiceId, TransactionId, UserId};
pub use invoice::{Invoice, InvoiceStatus};
pub use package::{find_package, CreditPackage, CREDIT_PACKAGES, CURRENCY};
pub use pricing::{
    Modality, PricingConfig, DEFAULT_STT_CREDITS_PER_SECOND, DEFAULT_TTS_CREDITS_PER_CHAR,
};
pub use transaction::{Transaction, TransactionType};
pub use vat::{calculate_vat_cents, is_eu_country, is_valid_vat_number, vat_rate};
