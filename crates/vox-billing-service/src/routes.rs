//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, credits, health, invoices, purchases, usage};
use crate::rate_limit;
use crate::state::AppState;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /v1/purchases/packages` - Credit package catalog
///
/// ## Accounts (gateway-forwarded user identity)
/// - `POST /v1/accounts` - Create account
/// - `GET /v1/accounts/me` - Get current user's account
///
/// ## Credits
/// - `GET /v1/credits/balance` - Get current balance
/// - `GET /v1/credits/transactions` - List transaction history
/// - `GET /v1/credits/transactions/:id` - Get one transaction
/// - `POST /v1/credits/consume` - Deduct credits (service auth)
/// - `POST /v1/credits/grant` - Admin credit grant (service auth)
/// - `POST /v1/credits/grant-monthly` - Monthly free grant (service auth)
/// - `GET /v1/credits/audit` - Balance reconciliation (service auth)
/// - `POST /v1/credits/expire` - Lapse expired credits (service auth)
///
/// ## Usage
/// - `POST /v1/usage/estimate` - Price a request without charging
/// - `POST /v1/usage/charge` - Estimate and deduct in one step (service auth)
///
/// ## Purchases and invoices
/// - `POST /v1/purchases/quote` - Price a package for a buyer
/// - `POST /v1/purchases/intent` - Create a payment intent
/// - `POST /v1/purchases/confirm` - Settle a completed payment
/// - `GET /v1/invoices` - List the caller's invoices
/// - `GET /v1/invoices/:id` - Get one invoice
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    // Build CORS layer
    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/health", get(health::health))
        // Accounts
        .route("/v1/accounts", post(accounts::create_account))
        .route("/v1/accounts/me", get(accounts::get_account))
        // Credits
        .route("/v1/credits/balance", get(credits::get_balance))
        .route("/v1/credits/transactions", get(credits::list_transactions))
        .route(
            "/v1/credits/transactions/:id",
            get(credits::get_transaction),
        )
        .route("/v1/credits/consume", post(credits::consume_credits))
        .route("/v1/credits/grant", post(credits::grant_credits))
        .route(
            "/v1/credits/grant-monthly",
            post(credits::grant_monthly_credits),
        )
        .route("/v1/credits/audit", get(credits::audit_balance))
        .route("/v1/credits/expire", post(credits::expire_credits))
        // Usage
        .route("/v1/usage/estimate", post(usage::estimate_usage))
        .route("/v1/usage/charge", post(usage::charge_usage))
        // Purchases
        .route("/v1/purchases/packages", get(purchases::list_packages))
        .route("/v1/purchases/quote", post(purchases::quote_package))
        .route("/v1/purchases/intent", post(purchases::create_intent))
        .route("/v1/purchases/confirm", post(purchases::confirm_purchase))
        // Invoices
        .route("/v1/invoices", get(invoices::list_invoices))
        .route("/v1/invoices/:id", get(invoices::get_invoice))
        // Middleware. The rate limiter sits in front of every handler, so a
        // limited request is answered before any ledger code runs.
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limit::enforce,
        ))
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
