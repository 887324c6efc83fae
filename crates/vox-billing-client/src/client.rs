//! Vox-Billing HTTP client implementation.

use reqwest::Client;
use std::time::Duration;

use vox_billing_core::Modality;

use crate::error::ClientError;
use crate::types::{
    ApiErrorResponse, BalanceResponse, ChargeResponse, ChargeUsage, ConsumeCredits,
    ConsumeResponse, EstimateBody, EstimateResponse, TransactionsPage,
};

/// Vox-Billing API client.
///
/// Provides methods for estimating and charging usage and for reading
/// balances and history on behalf of a user. Service endpoints authenticate
/// with the API key; user-scoped reads send the user id the way the
/// platform gateway does.
#[derive(Debug, Clone)]
pub struct VoxBillingClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

impl VoxBillingClient {
    /// Create a new vox-billing client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the vox-billing service (e.g., `"http://vox-billing:8080"`)
    /// * `api_key` - Service API key for authentication
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new vox-billing client with custom options.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with default settings).
    #[must_use]
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            service_name: options.service_name,
        }
    }

    /// Estimate the credit cost of a unit of usage without charging it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn estimate_usage(
        &self,
        user_id: impl Into<String>,
        modality: Modality,
        input_size: f64,
    ) -> Result<EstimateResponse, ClientError> {
        let url = format!("{}/v1/usage/estimate", self.base_url);
        let body = EstimateBody {
            modality,
            input_size,
        };

        let response = self
            .client
            .post(&url)
            .header("x-user-id", user_id.into())
            .json(&body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Charge completed usage: estimate its cost and deduct it in one step.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InsufficientCredits`] when the balance cannot
    /// cover the charge, an error otherwise if the request fails.
    pub async fn charge_usage(&self, request: ChargeUsage) -> Result<ChargeResponse, ClientError> {
        let url = format!("{}/v1/usage/charge", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Deduct a pre-computed number of credits.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InsufficientCredits`] when the balance cannot
    /// cover the amount, an error otherwise if the request fails.
    pub async fn consume_credits(
        &self,
        request: ConsumeCredits,
    ) -> Result<ConsumeResponse, ClientError> {
        let url = format!("{}/v1/credits/consume", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a user's current balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_balance(
        &self,
        user_id: impl Into<String>,
    ) -> Result<BalanceResponse, ClientError> {
        let url = format!("{}/v1/credits/balance", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("x-user-id", user_id.into())
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List a page of a user's transaction history, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_transactions(
        &self,
        user_id: impl Into<String>,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<TransactionsPage, ClientError> {
        let url = format!("{}/v1/credits/transactions", self.base_url);
        let mut query: Vec<(&str, u32)> = Vec::new();
        if let Some(page) = page {
            query.push(("page", page));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit));
        }

        let response = self
            .client
            .get(&url)
            .header("x-user-id", user_id.into())
            .query(&query)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let code = api_error.error.code.as_str();
                let message = api_error.error.message;
                let details = api_error.error.details.as_ref();

                // Map specific error codes to typed errors
                match code {
                    "insufficient_credits" => {
                        let balance = details
                            .and_then(|d| d.get("balance"))
                            .and_then(serde_json::Value::as_i64)
                            .unwrap_or(0);
                        let required = details
                            .and_then(|d| d.get("required"))
                            .and_then(serde_json::Value::as_i64)
                            .unwrap_or(0);

                        Err(ClientError::InsufficientCredits { balance, required })
                    }
                    "rate_limited" => {
                        let retry_after_seconds = details
                            .and_then(|d| d.get("retry_after_seconds"))
                            .and_then(serde_json::Value::as_u64)
                            .unwrap_or(1);

                        Err(ClientError::RateLimited {
                            retry_after_seconds,
                        })
                    }
                    "account_not_found" => Err(ClientError::AccountNotFound {
                        user_id: message.replace("account not found: ", ""),
                    }),
                    _ => Err(ClientError::Api {
                        code: code.to_string(),
                        message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Service name to include in requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            service_name: "unknown".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options with a service name.
    #[must_use]
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Self::default()
        }
    }
}
