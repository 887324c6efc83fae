//! Invoice types for vox-billing.
//!
//! One invoice is issued per settled purchase, keyed uniquely by the
//! payment intent. The amounts are copied verbatim from the quote that
//! priced the payment; settlement never recomputes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{InvoiceId, UserId};

/// An invoice for a settled credit purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique invoice ID (ULID).
    pub id: InvoiceId,

    /// The purchasing user.
    pub user_id: UserId,

    /// The package that was purchased.
    pub package_id: String,

    /// Credits granted by the purchase.
    pub credits: i64,

    /// Net amount in minor currency units, before VAT.
    pub amount_cents: i64,

    /// VAT amount in minor currency units.
    pub vat_amount_cents: i64,

    /// Total charged: net plus VAT.
    pub total_amount_cents: i64,

    /// ISO currency code, lowercase ("usd").
    pub currency: String,

    /// Invoice status.
    pub status: InvoiceStatus,

    /// The payment intent that funded this invoice. Unique per invoice.
    pub payment_intent_id: String,

    /// Buyer's VAT number, if supplied.
    pub vat_number: Option<String>,

    /// Buyer's country (ISO 3166-1 alpha-2).
    pub country: String,

    /// Whether the buyer purchased as a business (reverse charge, no VAT).
    pub is_business: bool,

    /// When the invoice was issued.
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// Display number for statements, derived from the ULID's leading
    /// timestamp characters.
    #[must_use]
    pub fn display_number(&self) -> String {
        let id = self.id.to_string();
        format!("INV-{}", &id[..8])
    }
}

/// Status of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Awaiting payment confirmation.
    Pending,

    /// Paid in full. Invoices minted at settlement start here.
    Paid,

    /// Payment failed after the invoice was opened.
    Failed,
}
