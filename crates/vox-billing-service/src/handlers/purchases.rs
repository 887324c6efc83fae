//! Credit package purchase handlers.
//!
//! A purchase happens in three steps:
//!
//! 1. `quote` prices the package for the buyer's country (VAT is computed
//!    here, before any payment exists).
//! 2. `intent` creates the external payment intent for the quoted total,
//!    recording the quote in the intent's metadata.
//! 3. `confirm` verifies the captured payment against that metadata and
//!    mints the credits and the invoice, exactly once per intent.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use vox_billing_core::{CreditPackage, CREDIT_PACKAGES};
use vox_billing_ledger::{ConfirmPurchaseRequest, PurchaseQuote, QuoteRequest};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::invoices::InvoiceResponse;
use crate::state::AppState;
use crate::stripe::CreateIntentParams;

/// One catalog entry.
#[derive(Debug, Serialize)]
pub struct PackageResponse {
    /// Package identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Credits granted on purchase.
    pub credits: i64,
    /// Net price in minor units.
    pub price_cents: i64,
    /// Lowercase ISO 4217 currency.
    pub currency: String,
}

impl From<&CreditPackage> for PackageResponse {
    fn from(package: &CreditPackage) -> Self {
        Self {
            id: package.id.to_string(),
            name: package.name.to_string(),
            credits: package.credits,
            price_cents: package.price_cents,
            currency: vox_billing_core::CURRENCY.to_string(),
        }
    }
}

/// List the credit package catalog.
pub async fn list_packages() -> Json<Vec<PackageResponse>> {
    Json(CREDIT_PACKAGES.iter().map(PackageResponse::from).collect())
}

/// Quote request body.
#[derive(Debug, Deserialize)]
pub struct QuoteBody {
    /// Catalog package identifier.
    pub package_id: String,
    /// ISO 3166-1 alpha-2 country code, uppercase.
    pub country: String,
    /// Whether the buyer is VAT-registered (reverse charge applies).
    #[serde(default)]
    pub is_business: bool,
    /// Buyer's VAT number, when one was given.
    pub vat_number: Option<String>,
}

/// Price a package for the current user.
pub async fn quote_package(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Json(body): Json<QuoteBody>,
) -> Result<Json<PurchaseQuote>, ApiError> {
    let request = QuoteRequest {
        package_id: body.package_id,
        country: body.country,
        is_business: body.is_business,
        vat_number: body.vat_number,
    };
    let quote = state.settlement.quote_package(&request)?;

    Ok(Json(quote))
}

/// Intent response.
#[derive(Debug, Serialize)]
pub struct IntentResponse {
    /// Provider payment intent id.
    pub payment_intent_id: String,
    /// Client secret the frontend uses to collect the payment.
    pub client_secret: String,
    /// The quote the intent was created for.
    pub quote: PurchaseQuote,
}

/// Create a payment intent for a quoted package.
///
/// The intent carries the buyer, package, credits, and VAT figures in its
/// metadata; settlement later verifies the captured payment against them.
pub async fn create_intent(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<QuoteBody>,
) -> Result<Json<IntentResponse>, ApiError> {
    // The buyer must have an account before money moves.
    state.ledger.account(auth.user_id)?;

    let stripe = state
        .stripe
        .as_ref()
        .ok_or_else(|| ApiError::Gateway("payment provider not configured".into()))?;

    let request = QuoteRequest {
        package_id: body.package_id,
        country: body.country,
        is_business: body.is_business,
        vat_number: body.vat_number,
    };
    let quote = state.settlement.quote_package(&request)?;

    let intent = stripe
        .create_payment_intent(&CreateIntentParams {
            amount_cents: quote.total_amount_cents,
            currency: quote.currency.clone(),
            user_id: auth.user_id.to_string(),
            package_id: quote.package_id.clone(),
            credits: quote.credits,
            vat_amount_cents: quote.vat_amount_cents,
            country: request.country.clone(),
            is_business: request.is_business,
            vat_number: request.vat_number.clone(),
        })
        .await
        .map_err(|e| {
            tracing::error!(user_id = %auth.user_id, error = %e, "Failed to create payment intent");
            ApiError::Gateway(format!("Failed to create payment intent: {e}"))
        })?;

    let client_secret = intent
        .client_secret
        .ok_or_else(|| ApiError::Gateway("Stripe returned no client secret".into()))?;

    tracing::info!(
        user_id = %auth.user_id,
        payment_intent_id = %intent.id,
        package_id = %quote.package_id,
        total_amount_cents = %quote.total_amount_cents,
        "Payment intent created"
    );

    Ok(Json(IntentResponse {
        payment_intent_id: intent.id,
        client_secret,
        quote,
    }))
}

/// Confirm request body.
#[derive(Debug, Deserialize)]
pub struct ConfirmBody {
    /// Catalog package the buyer paid for.
    pub package_id: String,
    /// Provider payment id to verify and settle.
    pub payment_intent_id: String,
}

/// Confirm response.
#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    /// The PURCHASE ledger entry.
    pub transaction_id: String,
    /// Credits granted by the purchase.
    pub credits: i64,
    /// Balance after settlement.
    pub balance_credits: i64,
    /// The minted (or replayed) invoice.
    pub invoice: InvoiceResponse,
    /// Whether this payment intent was already settled.
    pub replayed: bool,
}

/// Verify a completed payment and mint its credits and invoice.
pub async fn confirm_purchase(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<ConfirmBody>,
) -> Result<Json<ConfirmResponse>, ApiError> {
    let request = ConfirmPurchaseRequest {
        user_id: auth.user_id,
        package_id: body.package_id,
        payment_intent_id: body.payment_intent_id,
    };
    let receipt = state.settlement.confirm_purchase(request).await?;

    tracing::info!(
        user_id = %auth.user_id,
        payment_intent_id = %receipt.invoice.payment_intent_id,
        invoice = %receipt.invoice.display_number(),
        credits = %receipt.transaction.amount_credits,
        balance_credits = %receipt.balance_credits,
        replayed = %receipt.replayed,
        "Purchase settled"
    );

    Ok(Json(ConfirmResponse {
        transaction_id: receipt.transaction.id.to_string(),
        credits: receipt.transaction.amount_credits,
        balance_credits: receipt.balance_credits,
        invoice: InvoiceResponse::from(&receipt.invoice),
        replayed: receipt.replayed,
    }))
}
