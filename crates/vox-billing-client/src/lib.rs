//! Vox-Billing Client SDK.
//!
//! This crate provides a client library for services to interact with the
//! vox-billing API: estimating usage cost, charging completed usage, and
//! reading balances and history on behalf of a user.
//!
//! # Example
//!
//! ```no_run
//! use vox_billing_client::{ChargeUsage, VoxBillingClient};
//! use vox_billing_core::Modality;
//!
//! # async fn example() -> Result<(), vox_billing_client::ClientError> {
//! let client = VoxBillingClient::new(
//!     "http://vox-billing.billing-system.svc:8080",
//!     "your-service-api-key",
//! );
//!
//! // Charge 1000 characters of synthesized speech
//! let response = client
//!     .charge_usage(ChargeUsage {
//!         user_id: "user-uuid".to_string(),
//!         modality: Modality::Tts,
//!         input_size: 1000.0,
//!         request_id: Some("req_123".to_string()),
//!         metadata: None,
//!     })
//!     .await?;
//!
//! println!("New balance: {} credits", response.balance_credits);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, VoxBillingClient};
pub use error::ClientError;
pub use types::*;
