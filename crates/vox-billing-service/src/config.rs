//! Service configuration.

use serde::Deserialize;
use std::path::Path;

use vox_billing_core::{LedgerConfig, PricingConfig};

/// Per-window request quotas for the ledger-facing endpoints.
///
/// The limiter sits in front of the handlers, so a rejected request never
/// reaches the ledger at all.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Length of the fixed window in seconds.
    pub window_seconds: u64,

    /// Requests per window for usage estimation.
    pub estimate_limit: u32,

    /// Requests per window for usage charges.
    pub charge_limit: u32,

    /// Requests per window for direct consumption.
    pub consume_limit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_seconds: 60,
            estimate_limit: 120,
            charge_limit: 60,
            consume_limit: 100,
        }
    }
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/vox-billing").
    pub data_dir: String,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Stripe API key (optional).
    pub stripe_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Pricing configuration.
    pub pricing: PricingConfig,

    /// Ledger configuration (expiration, free grant, page cap).
    pub ledger: LedgerConfig,

    /// Rate limiting quotas.
    pub rate_limits: RateLimitConfig,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        // Try to load the Stripe key from a secrets file first, then fall
        // back to the environment
        let stripe_api_key = load_stripe_secrets();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/vox-billing".into()),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            stripe_api_key,
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parsed("MAX_BODY_BYTES", 1024 * 1024), // 1MB
            request_timeout_seconds: env_parsed("REQUEST_TIMEOUT_SECONDS", 30),
            pricing: PricingConfig {
                tts_credits_per_char: env_parsed(
                    "TTS_CREDITS_PER_CHAR",
                    vox_billing_core::DEFAULT_TTS_CREDITS_PER_CHAR,
                ),
                stt_credits_per_second: env_parsed(
                    "STT_CREDITS_PER_SECOND",
                    vox_billing_core::DEFAULT_STT_CREDITS_PER_SECOND,
                ),
            },
            ledger: LedgerConfig {
                credits_expiration_years: env_parsed(
                    "CREDITS_EXPIRATION_YEARS",
                    vox_billing_core::DEFAULT_CREDITS_EXPIRATION_YEARS,
                ),
                free_monthly_credits: env_parsed(
                    "FREE_MONTHLY_CREDITS",
                    vox_billing_core::DEFAULT_FREE_MONTHLY_CREDITS,
                ),
                max_transactions_per_page: env_parsed(
                    "MAX_TRANSACTIONS_PER_PAGE",
                    vox_billing_core::DEFAULT_MAX_TRANSACTIONS_PER_PAGE,
                ),
            },
            rate_limits: RateLimitConfig {
                window_seconds: env_parsed("RATE_LIMIT_WINDOW_SECONDS", 60),
                estimate_limit: env_parsed("RATE_LIMIT_ESTIMATE", 120),
                charge_limit: env_parsed("RATE_LIMIT_CHARGE", 60),
                consume_limit: env_parsed("RATE_LIMIT_CONSUME", 100),
            },
        }
    }
}

/// Read a parseable env var, falling back to a default.
fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Load the Stripe API key from file or environment.
fn load_stripe_secrets() -> Option<String> {
    let secret_paths = [".secrets/stripe.json", "../.secrets/stripe.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return Some(secrets.api_key);
        }
    }

    // Fall back to environment variables
    tracing::debug!("Stripe secrets file not found, using environment variables");
    std::env::var("STRIPE_API_KEY").ok()
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/vox-billing".into(),
            service_api_key: None,
            stripe_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            pricing: PricingConfig::default(),
            ledger: LedgerConfig::default(),
            rate_limits: RateLimitConfig::default(),
        }
    }
}
