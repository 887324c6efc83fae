//! Application state.
//!
//! [`AppState::new`] is the composition root: it receives the storage
//! handle, builds the ledger and settlement engines around it, and wires
//! the payment gateway in as the verification capability. Tests use
//! [`AppState::with_verifier`] to inject a stub instead.

use std::sync::Arc;

use async_trait::async_trait;

use vox_billing_core::{LedgerError, Result as CoreResult};
use vox_billing_ledger::{CreditLedger, PaymentConfirmation, PaymentVerifier, PurchaseSettlement};
use vox_billing_store::RocksStore;

use crate::config::ServiceConfig;
use crate::rate_limit::RateLimiter;
use crate::stripe::StripeClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<RocksStore>,

    /// The credit ledger.
    pub ledger: Arc<CreditLedger<RocksStore>>,

    /// Purchase settlement over the injected payment verifier.
    pub settlement: Arc<PurchaseSettlement<RocksStore>>,

    /// Stripe client for creating payment intents (optional).
    pub stripe: Option<Arc<StripeClient>>,

    /// Fixed-window rate limiter state.
    pub rate_limiter: Arc<RateLimiter>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create the application state, wiring Stripe as the payment verifier.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig) -> Self {
        let stripe = config.stripe_api_key.as_ref().map(|key| {
            tracing::info!("Stripe integration enabled");
            Arc::new(StripeClient::new(key))
        });

        let verifier: Arc<dyn PaymentVerifier> = match &stripe {
            Some(client) => client.clone(),
            None => {
                tracing::warn!("Stripe not configured - purchases cannot be settled");
                Arc::new(UnconfiguredPayments)
            }
        };

        Self::wire(store, stripe, verifier, config)
    }

    /// Create the application state with an injected payment verifier.
    ///
    /// Used by integration tests to settle purchases against a stub, and by
    /// deployments that front a different payment gateway.
    #[must_use]
    pub fn with_verifier(
        store: Arc<RocksStore>,
        verifier: Arc<dyn PaymentVerifier>,
        config: ServiceConfig,
    ) -> Self {
        let stripe = config
            .stripe_api_key
            .as_ref()
            .map(|key| Arc::new(StripeClient::new(key)));
        Self::wire(store, stripe, verifier, config)
    }

    fn wire(
        store: Arc<RocksStore>,
        stripe: Option<Arc<StripeClient>>,
        verifier: Arc<dyn PaymentVerifier>,
        config: ServiceConfig,
    ) -> Self {
        let ledger = Arc::new(CreditLedger::new(
            store.clone(),
            config.ledger.clone(),
            config.pricing.clone(),
        ));
        let settlement = Arc::new(PurchaseSettlement::new(
            store.clone(),
            verifier,
            config.ledger.clone(),
        ));

        Self {
            store,
            ledger,
            settlement,
            stripe,
            rate_limiter: Arc::new(RateLimiter::new()),
            config,
        }
    }

    /// Check if Stripe is configured.
    #[must_use]
    pub fn has_stripe(&self) -> bool {
        self.stripe.is_some()
    }
}

/// Verifier used when no payment gateway is configured.
struct UnconfiguredPayments;

#[async_trait]
impl PaymentVerifier for UnconfiguredPayments {
    async fn verify_payment(&self, _payment_intent_id: &str) -> CoreResult<PaymentConfirmation> {
        Err(LedgerError::PaymentProvider(
            "payment provider not configured".into(),
        ))
    }
}
