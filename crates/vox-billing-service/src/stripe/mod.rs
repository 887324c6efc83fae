//! Stripe integration for payments.
//!
//! Stripe handles:
//! - Payment intent creation for package purchases
//! - Payment verification during settlement
//!
//! The client doubles as the [`vox_billing_ledger::PaymentVerifier`]
//! implementation the settlement engine is wired with in production.

pub mod client;
pub mod types;

pub use client::{CreateIntentParams, StripeClient, StripeError};
pub use types::*;
