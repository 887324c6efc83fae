//! Typed request structs for ledger operations.
//!
//! Every mutating entry point takes one of these and calls `validate`
//! before touching storage, so malformed input is rejected without I/O
//! and without consuming an idempotency key.

use std::collections::BTreeMap;

use vox_billing_core::{is_valid_vat_number, LedgerError, Modality, Result, UserId};

/// Longest accepted description or reason line.
const MAX_DESCRIPTION_LEN: usize = 255;

/// Longest accepted caller-supplied request id.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Longest accepted payment intent id.
const MAX_INTENT_LEN: usize = 255;

fn check_description(description: &str, field: &str) -> Result<()> {
    if description.is_empty() || description.len() > MAX_DESCRIPTION_LEN {
        return Err(LedgerError::Validation(format!(
            "{field} must be 1-{MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

fn check_request_id(request_id: Option<&str>) -> Result<()> {
    if let Some(id) = request_id {
        if id.is_empty() || id.len() > MAX_REQUEST_ID_LEN {
            return Err(LedgerError::Validation(format!(
                "request_id must be 1-{MAX_REQUEST_ID_LEN} characters"
            )));
        }
    }
    Ok(())
}

/// Deduct an amount of credits the caller has already computed.
///
/// This is the bridge for metering callers that do their own accounting.
/// Usage-driven deduction with built-in estimation goes through
/// [`ChargeUsageRequest`] instead.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    /// Account to deduct from.
    pub user_id: UserId,

    /// Whole credits to deduct. Must be positive.
    pub amount_credits: i64,

    /// Human-readable reason, 1-255 characters.
    pub description: String,

    /// Caller-stable key for at-most-once application.
    pub request_id: Option<String>,

    /// Free-form context persisted with the entry.
    pub metadata: serde_json::Value,
}

impl ConsumeRequest {
    /// Check the request without touching storage.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] for a non-positive amount and
    /// [`LedgerError::Validation`] for malformed fields.
    pub fn validate(&self) -> Result<()> {
        if self.amount_credits <= 0 {
            return Err(LedgerError::InvalidAmount(
                "amount must be a positive integer".into(),
            ));
        }
        check_description(&self.description, "description")?;
        check_request_id(self.request_id.as_deref())
    }
}

/// Which kind of credit entry to append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditKind {
    /// Paid top-up. Requires a payment intent id for deduplication.
    Purchase,

    /// Monthly free allowance.
    FreeGrant,

    /// Compensating entry for a refunded charge.
    Refund,

    /// Manual operator correction.
    AdminAdjust,
}

/// Add credits to an account.
#[derive(Debug, Clone)]
pub struct CreditRequest {
    /// Account to credit.
    pub user_id: UserId,

    /// Whole credits to add. Must be positive.
    pub amount_credits: i64,

    /// What kind of entry this is.
    pub kind: CreditKind,

    /// Reason line, required for `Refund` and `AdminAdjust`.
    pub reason: Option<String>,

    /// Caller-stable key for at-most-once application.
    pub request_id: Option<String>,

    /// Provider payment id. Required when `kind` is `Purchase`; purchases
    /// are deduplicated on it.
    pub payment_intent_id: Option<String>,
}

impl CreditRequest {
    /// Check the request without touching storage.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] for a non-positive amount and
    /// [`LedgerError::Validation`] when a field required by `kind` is
    /// missing or malformed.
    pub fn validate(&self) -> Result<()> {
        if self.amount_credits <= 0 {
            return Err(LedgerError::InvalidAmount(
                "amount must be a positive integer".into(),
            ));
        }
        match self.kind {
            CreditKind::Purchase => match self.payment_intent_id.as_deref() {
                Some(intent) if !intent.is_empty() && intent.len() <= MAX_INTENT_LEN => {}
                _ => {
                    return Err(LedgerError::Validation(
                        "purchase credits require a payment_intent_id".into(),
                    ));
                }
            },
            CreditKind::Refund | CreditKind::AdminAdjust => {
                let reason = self.reason.as_deref().unwrap_or("");
                check_description(reason, "reason")?;
            }
            CreditKind::FreeGrant => {}
        }
        check_request_id(self.request_id.as_deref())
    }
}

/// Meter usage of a speech model and deduct the estimated credits.
#[derive(Debug, Clone)]
pub struct ChargeUsageRequest {
    /// Account to deduct from.
    pub user_id: UserId,

    /// Which model family was used.
    pub modality: Modality,

    /// Characters synthesized for TTS, seconds of audio for STT.
    pub input_size: f64,

    /// Caller-stable key for at-most-once application.
    pub request_id: Option<String>,

    /// Extra context, appended to the description as `key=value` pairs
    /// and persisted with the entry.
    pub metadata: BTreeMap<String, String>,
}

impl ChargeUsageRequest {
    /// Check the request without touching storage.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] for a non-positive or
    /// non-finite input size and [`LedgerError::Validation`] for a
    /// malformed request id.
    pub fn validate(&self) -> Result<()> {
        if !self.input_size.is_finite() || self.input_size <= 0.0 {
            return Err(LedgerError::InvalidAmount(
                "input_size must be a positive finite number".into(),
            ));
        }
        check_request_id(self.request_id.as_deref())
    }
}

/// Fetch one page of a user's transaction history.
#[derive(Debug, Clone, Copy)]
pub struct ListTransactionsRequest {
    /// Account whose history is listed.
    pub user_id: UserId,

    /// 1-based page number.
    pub page: u32,

    /// Page size. Capped by the server's configured maximum.
    pub limit: u32,
}

impl ListTransactionsRequest {
    /// Check the pagination parameters.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] when page or limit is zero, or
    /// when the limit exceeds `max_limit`.
    pub fn validate(&self, max_limit: u32) -> Result<()> {
        if self.page < 1 || self.limit < 1 {
            return Err(LedgerError::Validation("invalid page or limit".into()));
        }
        if self.limit > max_limit {
            return Err(LedgerError::Validation(format!(
                "limit cannot be greater than {max_limit}"
            )));
        }
        Ok(())
    }
}

/// Price a credit package for a buyer before any payment exists.
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    /// Catalog package identifier.
    pub package_id: String,

    /// ISO 3166-1 alpha-2 country code, uppercase.
    pub country: String,

    /// Whether the buyer is VAT-registered (reverse charge applies).
    pub is_business: bool,

    /// Buyer's VAT number, validated for shape when present.
    pub vat_number: Option<String>,
}

impl QuoteRequest {
    /// Check the request without touching the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for a missing package id, a
    /// malformed country code, or a malformed VAT number.
    pub fn validate(&self) -> Result<()> {
        if self.package_id.is_empty() {
            return Err(LedgerError::Validation("package_id is required".into()));
        }
        if self.country.len() != 2 || !self.country.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(LedgerError::Validation(
                "country must be a two-letter uppercase code".into(),
            ));
        }
        if let Some(vat_number) = self.vat_number.as_deref() {
            if !is_valid_vat_number(vat_number) {
                return Err(LedgerError::Validation("invalid VAT number format".into()));
            }
        }
        Ok(())
    }
}

/// Confirm a completed external payment and mint its credits.
#[derive(Debug, Clone)]
pub struct ConfirmPurchaseRequest {
    /// Buyer's account.
    pub user_id: UserId,

    /// Catalog package the buyer claims to have paid for.
    pub package_id: String,

    /// Provider payment id to verify and settle.
    pub payment_intent_id: String,
}

impl ConfirmPurchaseRequest {
    /// Check the request without touching storage or the provider.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for missing fields.
    pub fn validate(&self) -> Result<()> {
        if self.package_id.is_empty() {
            return Err(LedgerError::Validation("package_id is required".into()));
        }
        if self.payment_intent_id.is_empty() || self.payment_intent_id.len() > MAX_INTENT_LEN {
            return Err(LedgerError::Validation(
                "payment_intent_id is required".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consume(amount: i64, description: &str, request_id: Option<&str>) -> ConsumeRequest {
        ConsumeRequest {
            user_id: UserId::generate(),
            amount_credits: amount,
            description: description.into(),
            request_id: request_id.map(String::from),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn consume_accepts_well_formed() {
        assert!(consume(10, "Usage[TTS] credits=10", Some("req-1"))
            .validate()
            .is_ok());
    }

    #[test]
    fn consume_rejects_nonpositive_amount() {
        assert!(matches!(
            consume(0, "x", None).validate(),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            consume(-5, "x", None).validate(),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn consume_rejects_bad_description() {
        assert!(matches!(
            consume(10, "", None).validate(),
            Err(LedgerError::Validation(_))
        ));
        let long = "x".repeat(256);
        assert!(matches!(
            consume(10, &long, None).validate(),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn consume_rejects_empty_request_id() {
        assert!(matches!(
            consume(10, "ok", Some("")).validate(),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn credit_purchase_requires_intent() {
        let request = CreditRequest {
            user_id: UserId::generate(),
            amount_credits: 10_000,
            kind: CreditKind::Purchase,
            reason: None,
            request_id: None,
            payment_intent_id: None,
        };
        assert!(matches!(
            request.validate(),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn credit_refund_requires_reason() {
        let request = CreditRequest {
            user_id: UserId::generate(),
            amount_credits: 100,
            kind: CreditKind::Refund,
            reason: None,
            request_id: Some("refund-1".into()),
            payment_intent_id: None,
        };
        assert!(matches!(
            request.validate(),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn charge_rejects_bad_input_size() {
        for bad in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            let request = ChargeUsageRequest {
                user_id: UserId::generate(),
                modality: Modality::Tts,
                input_size: bad,
                request_id: None,
                metadata: BTreeMap::new(),
            };
            assert!(
                matches!(request.validate(), Err(LedgerError::InvalidAmount(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn list_rejects_zero_and_oversized() {
        let base = ListTransactionsRequest {
            user_id: UserId::generate(),
            page: 1,
            limit: 10,
        };
        assert!(base.validate(10).is_ok());

        let err = ListTransactionsRequest { page: 0, ..base }
            .validate(10)
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid request: invalid page or limit");

        let err = ListTransactionsRequest { limit: 11, ..base }
            .validate(10)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid request: limit cannot be greater than 10"
        );
    }

    #[test]
    fn quote_checks_country_and_vat_number() {
        let good = QuoteRequest {
            package_id: "starter".into(),
            country: "DE".into(),
            is_business: true,
            vat_number: Some("DE123456789".into()),
        };
        assert!(good.validate().is_ok());

        let bad_country = QuoteRequest {
            country: "deu".into(),
            ..good.clone()
        };
        assert!(bad_country.validate().is_err());

        let bad_vat = QuoteRequest {
            vat_number: Some("12345".into()),
            ..good
        };
        assert!(bad_vat.validate().is_err());
    }

    #[test]
    fn confirm_requires_intent() {
        let request = ConfirmPurchaseRequest {
            user_id: UserId::generate(),
            package_id: "starter".into(),
            payment_intent_id: String::new(),
        };
        assert!(matches!(
            request.validate(),
            Err(LedgerError::Validation(_))
        ));
    }
}
