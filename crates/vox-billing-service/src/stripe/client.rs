//! Stripe API client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use vox_billing_core::{LedgerError, UserId};
use vox_billing_ledger::{PaymentConfirmation, PaymentVerifier};

use super::types::{PaymentIntent, StripeErrorResponse};

/// Error type for Stripe operations.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe API returned an error.
    #[error("Stripe API error: {error_type} - {message}")]
    Api {
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },
}

/// Parameters for creating a payment intent.
///
/// Every field except the amount lands in the intent's metadata, which is
/// what settlement later verifies the captured payment against.
#[derive(Debug, Clone)]
pub struct CreateIntentParams {
    /// Total to charge in minor units, VAT included.
    pub amount_cents: i64,
    /// Lowercase ISO 4217 currency.
    pub currency: String,
    /// Buyer's account id.
    pub user_id: String,
    /// Catalog package being purchased.
    pub package_id: String,
    /// Credits the purchase grants.
    pub credits: i64,
    /// VAT portion of the total, minor units.
    pub vat_amount_cents: i64,
    /// Buyer country.
    pub country: String,
    /// Whether the buyer is VAT-registered.
    pub is_business: bool,
    /// Buyer's VAT number, when one was given.
    pub vat_number: Option<String>,
}

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl StripeClient {
    /// Stripe API base URL.
    const BASE_URL: &'static str = "https://api.stripe.com/v1";

    /// Create a new Stripe client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Stripe secret API key (`sk_test_...` or `sk_live_...`)
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, Self::BASE_URL)
    }

    /// Create a client against a different API base, for tests.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[must_use]
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create a payment intent for a quoted purchase.
    ///
    /// The metadata keys (`userId`, `packageId`, `credits`, `vatAmount`,
    /// `country`, `isBusiness`, `vatNumber`) are the contract settlement
    /// verifies against; renaming them orphans in-flight payments.
    ///
    /// # Errors
    ///
    /// Returns [`StripeError`] when the request fails or Stripe rejects it.
    pub async fn create_payment_intent(
        &self,
        params: &CreateIntentParams,
    ) -> Result<PaymentIntent, StripeError> {
        let mut form = vec![
            ("amount", params.amount_cents.to_string()),
            ("currency", params.currency.clone()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("metadata[userId]", params.user_id.clone()),
            ("metadata[packageId]", params.package_id.clone()),
            ("metadata[credits]", params.credits.to_string()),
            ("metadata[vatAmount]", params.vat_amount_cents.to_string()),
            ("metadata[country]", params.country.clone()),
            ("metadata[isBusiness]", params.is_business.to_string()),
        ];

        if let Some(vat_number) = &params.vat_number {
            form.push(("metadata[vatNumber]", vat_number.clone()));
        }

        tracing::debug!(
            user_id = %params.user_id,
            package_id = %params.package_id,
            amount_cents = %params.amount_cents,
            "Creating Stripe payment intent"
        );

        let response = self
            .client
            .post(format!("{}/payment_intents", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&form)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a single payment intent by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StripeError`] when the request fails or Stripe rejects it.
    pub async fn get_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, StripeError> {
        let response = self
            .client
            .get(format!(
                "{}/payment_intents/{}",
                self.base_url, payment_intent_id
            ))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<StripeErrorResponse, _> = response.json().await;

        match error_body {
            Ok(stripe_error) => Err(StripeError::Api {
                error_type: stripe_error.error.error_type,
                message: stripe_error.error.message,
                code: stripe_error.error.code,
            }),
            Err(_) => Err(StripeError::Api {
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}

#[async_trait]
impl PaymentVerifier for StripeClient {
    async fn verify_payment(
        &self,
        payment_intent_id: &str,
    ) -> vox_billing_core::Result<PaymentConfirmation> {
        let intent = self
            .get_payment_intent(payment_intent_id)
            .await
            .map_err(|e| LedgerError::PaymentProvider(e.to_string()))?;

        Ok(confirmation_from_intent(intent))
    }
}

/// Map a Stripe intent onto the provider-neutral confirmation.
///
/// Metadata fields that are missing or unparseable become `None`; the
/// settlement engine treats those as a mismatch rather than trusting them.
fn confirmation_from_intent(intent: PaymentIntent) -> PaymentConfirmation {
    let meta = &intent.metadata;
    PaymentConfirmation {
        user_id: meta
            .get("userId")
            .and_then(|v| v.parse::<UserId>().ok()),
        package_id: meta.get("packageId").cloned(),
        credits: meta.get("credits").and_then(|v| v.parse().ok()),
        vat_amount_cents: meta.get("vatAmount").and_then(|v| v.parse().ok()),
        country: meta.get("country").cloned(),
        is_business: meta
            .get("isBusiness")
            .is_some_and(|v| v == "true"),
        vat_number: meta.get("vatNumber").cloned(),
        payment_intent_id: intent.id,
        status: intent.status,
        amount_cents: intent.amount,
        currency: intent.currency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn intent_json(id: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "status": status,
            "amount": 1190,
            "currency": "usd",
            "client_secret": format!("{id}_secret"),
            "metadata": {
                "userId": "6f9619ff-8b86-d011-b42d-00c04fc964ff",
                "packageId": "starter",
                "credits": "10000",
                "vatAmount": "190",
                "country": "DE",
                "isBusiness": "false"
            }
        })
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = StripeClient::with_base_url("sk_test_xxx", "http://localhost:9999/");
        assert_eq!(client.base_url, "http://localhost:9999");
    }

    #[tokio::test]
    async fn create_intent_sends_metadata_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_intents"))
            .and(header_exists("authorization"))
            // Bracketed keys arrive form-urlencoded.
            .and(body_string_contains("metadata%5BuserId%5D"))
            .and(body_string_contains("metadata%5BvatAmount%5D=190"))
            .and(body_string_contains("amount=1190"))
            .respond_with(ResponseTemplate::new(200).set_body_json(intent_json("pi_1", "requires_payment_method")))
            .expect(1)
            .mount(&server)
            .await;

        let client = StripeClient::with_base_url("sk_test_xxx", server.uri());
        let intent = client
            .create_payment_intent(&CreateIntentParams {
                amount_cents: 1190,
                currency: "usd".into(),
                user_id: "6f9619ff-8b86-d011-b42d-00c04fc964ff".into(),
                package_id: "starter".into(),
                credits: 10_000,
                vat_amount_cents: 190,
                country: "DE".into(),
                is_business: false,
                vat_number: None,
            })
            .await
            .unwrap();

        assert_eq!(intent.id, "pi_1");
        assert_eq!(intent.client_secret.as_deref(), Some("pi_1_secret"));
    }

    #[tokio::test]
    async fn verify_payment_maps_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payment_intents/pi_2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(intent_json("pi_2", "succeeded")))
            .mount(&server)
            .await;

        let client = StripeClient::with_base_url("sk_test_xxx", server.uri());
        let confirmation = client.verify_payment("pi_2").await.unwrap();

        assert_eq!(confirmation.status, "succeeded");
        assert_eq!(confirmation.amount_cents, 1190);
        assert_eq!(confirmation.package_id.as_deref(), Some("starter"));
        assert_eq!(confirmation.credits, Some(10_000));
        assert_eq!(confirmation.vat_amount_cents, Some(190));
        assert_eq!(confirmation.country.as_deref(), Some("DE"));
        assert!(!confirmation.is_business);
        assert!(confirmation.user_id.is_some());
    }

    #[tokio::test]
    async fn missing_metadata_maps_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payment_intents/pi_3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pi_3",
                "status": "succeeded",
                "amount": 500,
                "currency": "usd",
                "client_secret": null
            })))
            .mount(&server)
            .await;

        let client = StripeClient::with_base_url("sk_test_xxx", server.uri());
        let confirmation = client.verify_payment("pi_3").await.unwrap();

        assert!(confirmation.user_id.is_none());
        assert!(confirmation.package_id.is_none());
        assert!(confirmation.credits.is_none());
    }

    #[tokio::test]
    async fn stripe_errors_surface_the_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payment_intents/pi_4"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {
                    "type": "invalid_request_error",
                    "message": "No such payment_intent: 'pi_4'",
                    "code": "resource_missing"
                }
            })))
            .mount(&server)
            .await;

        let client = StripeClient::with_base_url("sk_test_xxx", server.uri());
        let err = client.get_payment_intent("pi_4").await.unwrap_err();

        match err {
            StripeError::Api { message, code, .. } => {
                assert!(message.contains("No such payment_intent"));
                assert_eq!(code.as_deref(), Some("resource_missing"));
            }
            StripeError::Http(_) => panic!("expected an API error"),
        }
    }
}
