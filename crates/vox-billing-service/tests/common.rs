//! Common test utilities for vox-billing integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use tempfile::TempDir;

use vox_billing_core::{LedgerConfig, LedgerError, PricingConfig, UserId};
use vox_billing_ledger::{PaymentConfirmation, PaymentVerifier, PAYMENT_STATUS_SUCCEEDED};
use vox_billing_service::{create_router, AppState, RateLimitConfig, ServiceConfig};
use vox_billing_store::RocksStore;

/// Payment verifier backed by a map of scripted confirmations.
///
/// Tests register a confirmation under an intent id; unregistered ids
/// behave like a provider outage.
#[derive(Default)]
pub struct StubVerifier {
    confirmations: Mutex<HashMap<String, PaymentConfirmation>>,
}

impl StubVerifier {
    /// Register the confirmation the provider will report for an intent.
    pub fn insert(&self, confirmation: PaymentConfirmation) {
        let mut map = self.confirmations.lock().unwrap();
        map.insert(confirmation.payment_intent_id.clone(), confirmation);
    }
}

#[async_trait]
impl PaymentVerifier for StubVerifier {
    async fn verify_payment(
        &self,
        payment_intent_id: &str,
    ) -> vox_billing_core::Result<PaymentConfirmation> {
        let map = self.confirmations.lock().unwrap();
        map.get(payment_intent_id).cloned().ok_or_else(|| {
            LedgerError::PaymentProvider(format!("no such payment intent: {payment_intent_id}"))
        })
    }
}

/// Build a succeeded confirmation whose metadata matches a starter purchase.
pub fn starter_confirmation(intent_id: &str, user_id: UserId) -> PaymentConfirmation {
    PaymentConfirmation {
        payment_intent_id: intent_id.to_string(),
        status: PAYMENT_STATUS_SUCCEEDED.to_string(),
        amount_cents: 1_190,
        currency: "usd".to_string(),
        user_id: Some(user_id),
        package_id: Some("starter".to_string()),
        credits: Some(10_000),
        vat_amount_cents: Some(190),
        country: Some("DE".to_string()),
        is_business: false,
        vat_number: None,
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
    /// Scripted payment provider used by settlement.
    pub payments: Arc<StubVerifier>,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Create a harness with custom configuration (rate limits, pricing).
    pub fn with_config(mut config: ServiceConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");
        config.data_dir = temp_dir.path().to_string_lossy().to_string();

        let service_api_key = config
            .service_api_key
            .clone()
            .unwrap_or_else(|| "test-service-key".to_string());

        let payments = Arc::new(StubVerifier::default());
        let state = AppState::with_verifier(Arc::new(store), payments.clone(), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");
        let test_user_id = UserId::generate();

        Self {
            server,
            _temp_dir: temp_dir,
            test_user_id,
            service_api_key,
            payments,
        }
    }

    /// The `x-user-id` value the gateway would forward for the test user.
    pub fn user_header(&self) -> String {
        self.test_user_id.to_string()
    }

    /// A different user's `x-user-id` value (for testing isolation).
    pub fn other_user_header() -> String {
        UserId::generate().to_string()
    }

    /// Create the test user's account and return its starting balance.
    pub async fn create_account(&self) -> i64 {
        let response = self
            .server
            .post("/v1/accounts")
            .add_header("x-user-id", self.user_header())
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        body["balance_credits"].as_i64().expect("balance in body")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Baseline configuration for tests: stub payments, default quotas.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        data_dir: String::new(), // overwritten with the temp dir
        service_api_key: Some("test-service-key".into()),
        stripe_api_key: None,
        cors_origins: vec!["*".into()],
        max_body_bytes: 1024 * 1024,
        request_timeout_seconds: 30,
        pricing: PricingConfig::default(),
        ledger: LedgerConfig::default(),
        rate_limits: RateLimitConfig::default(),
    }
}
