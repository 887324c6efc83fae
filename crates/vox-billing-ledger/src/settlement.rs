//! Purchase settlement: payment verification and atomic minting.
//!
//! VAT is computed once, at quote time, and travels with the payment
//! intent from then on. Settlement verifies the provider's record and
//! copies its amounts verbatim onto the invoice; it never reprices.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use vox_billing_core::{
    calculate_vat_cents, find_package, CreditPackage, Invoice, InvoiceId, InvoiceStatus,
    LedgerConfig, LedgerError, Result, Transaction, UserId, CURRENCY,
};
use vox_billing_store::Store;

use crate::ledger::run_with_retry;
use crate::requests::{ConfirmPurchaseRequest, QuoteRequest};

/// Payment state a provider reports once capture completes.
pub const PAYMENT_STATUS_SUCCEEDED: &str = "succeeded";

/// The provider's record of a payment, as settlement needs to see it.
///
/// The metadata fields echo what the intent-creation endpoint recorded;
/// they are `None` when the provider has no such key, which settlement
/// treats as a mismatch.
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    /// Provider payment id.
    pub payment_intent_id: String,

    /// Provider payment state, [`PAYMENT_STATUS_SUCCEEDED`] when done.
    pub status: String,

    /// Total amount charged in minor units, VAT included.
    pub amount_cents: i64,

    /// Lowercase ISO 4217 currency.
    pub currency: String,

    /// Buyer recorded at intent creation.
    pub user_id: Option<UserId>,

    /// Package recorded at intent creation.
    pub package_id: Option<String>,

    /// Credits recorded at intent creation.
    pub credits: Option<i64>,

    /// VAT portion recorded at intent creation, minor units.
    pub vat_amount_cents: Option<i64>,

    /// Buyer country recorded at intent creation.
    pub country: Option<String>,

    /// Whether the buyer was treated as VAT-registered.
    pub is_business: bool,

    /// Buyer's VAT number, when one was given.
    pub vat_number: Option<String>,
}

/// Capability to look up the state of an external payment.
///
/// The process entry point decides what implements this: the real payment
/// gateway in production, a stub in tests.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    /// Fetch the provider's record of a payment intent.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::PaymentProvider`] when the provider cannot
    /// be reached or answers with something undecodable.
    async fn verify_payment(&self, payment_intent_id: &str) -> Result<PaymentConfirmation>;
}

/// A priced package offer: what the buyer will be charged.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseQuote {
    /// Catalog package identifier.
    pub package_id: String,

    /// Credits granted on purchase.
    pub credits: i64,

    /// Net price in minor units.
    pub amount_cents: i64,

    /// VAT in minor units. Zero outside the EU and for reverse charge.
    pub vat_amount_cents: i64,

    /// `amount_cents + vat_amount_cents`.
    pub total_amount_cents: i64,

    /// Lowercase ISO 4217 currency.
    pub currency: String,
}

/// Outcome of confirming a purchase.
#[derive(Debug, Clone)]
pub struct SettlementReceipt {
    /// The PURCHASE ledger entry, minted or replayed.
    pub transaction: Transaction,

    /// The invoice, minted or replayed.
    pub invoice: Invoice,

    /// Balance after settlement.
    pub balance_credits: i64,

    /// Whether this payment intent was already settled.
    pub replayed: bool,
}

/// Turns verified external payments into credits and invoices.
pub struct PurchaseSettlement<S> {
    store: Arc<S>,
    verifier: Arc<dyn PaymentVerifier>,
    config: LedgerConfig,
}

impl<S: Store> PurchaseSettlement<S> {
    /// Create a settlement engine over injected storage and verification.
    pub fn new(store: Arc<S>, verifier: Arc<dyn PaymentVerifier>, config: LedgerConfig) -> Self {
        Self {
            store,
            verifier,
            config,
        }
    }

    /// Price a package for a buyer.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownPackage`] for an id not in the catalog;
    /// validation errors for malformed input.
    pub fn quote_package(&self, request: &QuoteRequest) -> Result<PurchaseQuote> {
        request.validate()?;
        let package =
            find_package(&request.package_id).ok_or_else(|| LedgerError::UnknownPackage {
                package_id: request.package_id.clone(),
            })?;

        let vat_amount_cents =
            calculate_vat_cents(package.price_cents, &request.country, request.is_business);

        Ok(PurchaseQuote {
            package_id: package.id.to_string(),
            credits: package.credits,
            amount_cents: package.price_cents,
            vat_amount_cents,
            total_amount_cents: package.price_cents + vat_amount_cents,
            currency: CURRENCY.to_string(),
        })
    }

    /// Confirm a completed payment and mint its credits and invoice.
    ///
    /// The first confirmation of a payment intent atomically appends the
    /// PURCHASE transaction and writes the invoice. Every later call with
    /// the same intent replays that result without changing anything.
    ///
    /// # Errors
    ///
    /// [`LedgerError::PaymentNotCompleted`] when the provider has not
    /// captured the payment, [`LedgerError::PaymentMismatch`] when the
    /// intent's recorded metadata does not match the purchase being
    /// claimed, [`LedgerError::AccountNotFound`] when the buyer has no
    /// account.
    pub async fn confirm_purchase(
        &self,
        request: ConfirmPurchaseRequest,
    ) -> Result<SettlementReceipt> {
        request.validate()?;
        let package =
            find_package(&request.package_id).ok_or_else(|| LedgerError::UnknownPackage {
                package_id: request.package_id.clone(),
            })?;

        let confirmation = self
            .verifier
            .verify_payment(&request.payment_intent_id)
            .await?;

        if confirmation.status != PAYMENT_STATUS_SUCCEEDED {
            return Err(LedgerError::PaymentNotCompleted {
                status: confirmation.status,
            });
        }
        check_metadata(&request, package, &confirmation)?;

        let now = Utc::now();
        let transaction = Transaction::purchase(
            request.user_id,
            package.credits,
            request.payment_intent_id.clone(),
            self.config.expiration_from(now),
        );
        let invoice = Invoice {
            id: InvoiceId::generate(),
            user_id: request.user_id,
            package_id: package.id.to_string(),
            credits: package.credits,
            amount_cents: package.price_cents,
            vat_amount_cents: confirmation.vat_amount_cents.unwrap_or(0),
            total_amount_cents: confirmation.amount_cents,
            currency: confirmation.currency.clone(),
            status: InvoiceStatus::Paid,
            payment_intent_id: request.payment_intent_id.clone(),
            vat_number: confirmation.vat_number.clone(),
            country: confirmation.country.clone().unwrap_or_default(),
            is_business: confirmation.is_business,
            created_at: now,
        };

        let outcome = run_with_retry("settle_purchase", request.user_id, || {
            self.store
                .settle_purchase(transaction.clone(), invoice.clone())
        })?;
        if outcome.replayed {
            debug!(
                user_id = %request.user_id,
                payment_intent_id = %request.payment_intent_id,
                "purchase already settled, replaying result"
            );
        }
        Ok(SettlementReceipt {
            transaction: outcome.transaction,
            invoice: outcome.invoice,
            balance_credits: outcome.new_balance_credits,
            replayed: outcome.replayed,
        })
    }

    /// List a user's invoices, newest first.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unavailable`] when storage keeps failing.
    pub fn invoices(&self, user_id: UserId) -> Result<Vec<Invoice>> {
        run_with_retry("list_invoices", user_id, || {
            self.store.list_invoices_by_user(&user_id)
        })
    }

    /// Fetch a single invoice owned by the user.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvoiceNotFound`] when the id does not exist or
    /// belongs to another user.
    pub fn invoice(&self, user_id: UserId, invoice_id: &InvoiceId) -> Result<Invoice> {
        let found = run_with_retry("get_invoice", user_id, || self.store.get_invoice(invoice_id))?;
        match found {
            Some(invoice) if invoice.user_id == user_id => Ok(invoice),
            _ => Err(LedgerError::InvoiceNotFound {
                invoice_id: invoice_id.to_string(),
            }),
        }
    }
}

/// Compare the intent's recorded metadata against the claimed purchase.
///
/// The detailed reason goes to the warn log; callers get the generic
/// verification failure.
fn check_metadata(
    request: &ConfirmPurchaseRequest,
    package: &CreditPackage,
    confirmation: &PaymentConfirmation,
) -> Result<()> {
    let mismatch = if confirmation.user_id != Some(request.user_id) {
        Some(format!(
            "user_id: expected {}, intent has {:?}",
            request.user_id, confirmation.user_id
        ))
    } else if confirmation.package_id.as_deref() != Some(request.package_id.as_str()) {
        Some(format!(
            "package_id: expected {}, intent has {:?}",
            request.package_id, confirmation.package_id
        ))
    } else if confirmation.credits != Some(package.credits) {
        Some(format!(
            "credits: expected {}, intent has {:?}",
            package.credits, confirmation.credits
        ))
    } else {
        None
    };

    if let Some(reason) = mismatch {
        warn!(
            user_id = %request.user_id,
            payment_intent_id = %confirmation.payment_intent_id,
            reason,
            "payment metadata mismatch"
        );
        return Err(LedgerError::PaymentMismatch { reason });
    }
    Ok(())
}
