//! Ledger orchestration over the storage layer.
//!
//! [`CreditLedger`] is the single authority for balance changes: it
//! validates typed requests, builds transaction records, and applies them
//! through a [`vox_billing_store::Store`] with bounded retry on
//! infrastructure failures. [`PurchaseSettlement`] adds the payment half:
//! quoting a package with VAT and confirming a completed external payment
//! into exactly one credit and one invoice.
//!
//! Neither type owns any global state. The process entry point constructs
//! them with a storage handle and, for settlement, a payment-verification
//! capability, and hands them to whatever surface exposes them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ledger;
pub mod requests;
pub mod settlement;

pub use ledger::{BalanceAudit, CreditLedger, LedgerReceipt, TransactionPage};
pub use requests::{
    ChargeUsageRequest, ConfirmPurchaseRequest, ConsumeRequest, CreditKind, CreditRequest,
    ListTransactionsRequest, QuoteRequest,
};
pub use settlement::{
    PaymentConfirmation, PaymentVerifier, PurchaseQuote, PurchaseSettlement, SettlementReceipt,
    PAYMENT_STATUS_SUCCEEDED,
};
