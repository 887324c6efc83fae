//! Invoice query handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use vox_billing_core::{Invoice, InvoiceId, InvoiceStatus, LedgerError};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Invoice response.
#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    /// Invoice ID.
    pub id: String,
    /// Display number for statements ("INV-...").
    pub number: String,
    /// Package that was purchased.
    pub package_id: String,
    /// Credits granted by the purchase.
    pub credits: i64,
    /// Net price in minor units.
    pub amount_cents: i64,
    /// VAT portion in minor units.
    pub vat_amount_cents: i64,
    /// Total charged in minor units.
    pub total_amount_cents: i64,
    /// Lowercase ISO 4217 currency.
    pub currency: String,
    /// Invoice status.
    pub status: InvoiceStatus,
    /// The payment intent that funded the purchase.
    pub payment_intent_id: String,
    /// Buyer's VAT number, when one was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vat_number: Option<String>,
    /// Buyer country.
    pub country: String,
    /// Whether the buyer was treated as VAT-registered.
    pub is_business: bool,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Invoice> for InvoiceResponse {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id.to_string(),
            number: invoice.display_number(),
            package_id: invoice.package_id.clone(),
            credits: invoice.credits,
            amount_cents: invoice.amount_cents,
            vat_amount_cents: invoice.vat_amount_cents,
            total_amount_cents: invoice.total_amount_cents,
            currency: invoice.currency.clone(),
            status: invoice.status,
            payment_intent_id: invoice.payment_intent_id.clone(),
            vat_number: invoice.vat_number.clone(),
            country: invoice.country.clone(),
            is_business: invoice.is_business,
            created_at: invoice.created_at.to_rfc3339(),
        }
    }
}

/// List invoices response.
#[derive(Debug, Serialize)]
pub struct ListInvoicesResponse {
    /// Invoices, newest first.
    pub invoices: Vec<InvoiceResponse>,
}

/// List the current user's invoices, newest first.
pub async fn list_invoices(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ListInvoicesResponse>, ApiError> {
    let invoices = state.settlement.invoices(auth.user_id)?;

    Ok(Json(ListInvoicesResponse {
        invoices: invoices.iter().map(InvoiceResponse::from).collect(),
    }))
}

/// Fetch a single invoice by id.
pub async fn get_invoice(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let invoice_id = id.parse::<InvoiceId>().map_err(LedgerError::from)?;
    let invoice = state.settlement.invoice(auth.user_id, &invoice_id)?;

    Ok(Json(InvoiceResponse::from(&invoice)))
}
