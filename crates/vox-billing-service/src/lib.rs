//! Vox-Billing HTTP API Service.
//!
//! This crate provides the HTTP API for the vox-billing service, including:
//!
//! - Account management and balances
//! - Usage estimation and metering charges
//! - Credit package purchases and invoices
//! - Operational endpoints (grants, expiration, audit)
//!
//! # Caller identity
//!
//! The service sits behind a gateway that authenticates sessions. Two kinds
//! of callers reach it:
//!
//! 1. **End users** - the gateway forwards the authenticated user id in the
//!    `x-user-id` header.
//! 2. **Metering services** - service-to-service requests carry the shared
//!    API key in `x-api-key` (speech workers, schedulers, etc.).
//!
//! # Wiring
//!
//! Nothing in this crate reaches for global state. [`AppState::new`] is the
//! composition root: the process entry point hands it the storage handle and
//! configuration, and tests swap the payment-verification capability through
//! [`AppState::with_verifier`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers without awaits still must be async

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod stripe;

pub use config::{RateLimitConfig, ServiceConfig};
pub use error::ApiError;
pub use rate_limit::{RateDecision, RateLimiter};
pub use routes::create_router;
pub use state::AppState;
pub use stripe::{StripeClient, StripeError};
