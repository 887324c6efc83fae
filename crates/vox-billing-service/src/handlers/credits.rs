//! Credit balance, history, and operational handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use vox_billing_core::{LedgerError, Transaction, TransactionId, TransactionType, UserId};
use vox_billing_ledger::{ConsumeRequest, CreditKind, CreditRequest, ListTransactionsRequest};

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Balance in whole credits.
    pub balance_credits: i64,
}

/// Get current credit balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance_credits = state.ledger.balance(auth.user_id)?;

    Ok(Json(BalanceResponse { balance_credits }))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// 1-based page to fetch (default: 1).
    pub page: Option<u32>,
    /// Page size (default and maximum: the server page cap).
    pub limit: Option<u32>,
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Amount in credits (positive = credit, negative = debit).
    pub amount_credits: i64,
    /// Transaction type.
    pub transaction_type: TransactionType,
    /// Balance after this transaction.
    pub balance_after_credits: i64,
    /// Description.
    pub description: String,
    /// When the granted credits lapse, for credit entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl From<&Transaction> for TransactionResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.to_string(),
            amount_credits: tx.amount_credits,
            transaction_type: tx.transaction_type,
            balance_after_credits: tx.balance_after_credits,
            description: tx.description.clone(),
            expiration_date: tx.expiration_date.map(|d| d.to_rfc3339()),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions on this page (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Total entries across all pages.
    pub total: u64,
    /// Total number of pages at this limit.
    pub pages: u64,
    /// The 1-based page this response covers.
    pub current: u32,
}

/// List transaction history, newest first.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    let request = ListTransactionsRequest {
        user_id: auth.user_id,
        page: query.page.unwrap_or(1),
        limit: query
            .limit
            .unwrap_or(state.config.ledger.max_transactions_per_page),
    };
    let page = state.ledger.list_transactions(request)?;

    Ok(Json(ListTransactionsResponse {
        transactions: page
            .transactions
            .iter()
            .map(TransactionResponse::from)
            .collect(),
        total: page.total,
        pages: page.pages,
        current: page.current,
    }))
}

/// Fetch a single transaction by id.
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let transaction_id = id.parse::<TransactionId>().map_err(LedgerError::from)?;
    let transaction = state.ledger.transaction(auth.user_id, &transaction_id)?;

    Ok(Json(TransactionResponse::from(&transaction)))
}

/// Direct consumption request from a metering service.
#[derive(Debug, Deserialize)]
pub struct ConsumeCreditsRequest {
    /// User to charge.
    pub user_id: String,
    /// Credits to deduct.
    pub amount_credits: i64,
    /// What the deduction was for.
    pub description: Option<String>,
    /// Idempotency key; resending deducts once.
    pub request_id: Option<String>,
    /// Additional context stored on the transaction.
    pub metadata: Option<serde_json::Value>,
}

/// Consumption response.
#[derive(Debug, Serialize)]
pub struct ConsumeCreditsResponse {
    /// The deduction entry.
    pub transaction_id: String,
    /// Credits deducted by this entry.
    pub amount_credits: i64,
    /// Balance after the deduction.
    pub balance_credits: i64,
    /// Whether an earlier request already applied this deduction.
    pub replayed: bool,
}

/// Deduct credits on behalf of a metering service.
pub async fn consume_credits(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<ConsumeCreditsRequest>,
) -> Result<Json<ConsumeCreditsResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    let request = ConsumeRequest {
        user_id,
        amount_credits: body.amount_credits,
        description: body
            .description
            .unwrap_or_else(|| format!("API usage by {}", auth.service_name)),
        request_id: body.request_id,
        metadata: body.metadata.unwrap_or_default(),
    };
    let receipt = state.ledger.consume(request)?;

    tracing::info!(
        user_id = %user_id,
        service = %auth.service_name,
        amount_credits = %body.amount_credits,
        balance_credits = %receipt.balance_credits,
        replayed = %receipt.replayed,
        "Credits consumed"
    );

    Ok(Json(ConsumeCreditsResponse {
        transaction_id: receipt.transaction.id.to_string(),
        amount_credits: receipt.transaction.amount_credits.abs(),
        balance_credits: receipt.balance_credits,
        replayed: receipt.replayed,
    }))
}

/// Administrative grant request.
#[derive(Debug, Deserialize)]
pub struct GrantCreditsRequest {
    /// User to credit.
    pub user_id: String,
    /// Credits to add.
    pub amount_credits: i64,
    /// Why the credits were granted.
    pub reason: String,
    /// Idempotency key; resending grants once.
    pub request_id: Option<String>,
}

/// Grant response.
#[derive(Debug, Serialize)]
pub struct GrantCreditsResponse {
    /// The grant entry.
    pub transaction_id: String,
    /// Balance after the grant.
    pub balance_credits: i64,
    /// Whether an earlier request already applied this grant.
    pub replayed: bool,
}

/// Add credits as an administrative adjustment.
pub async fn grant_credits(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<GrantCreditsRequest>,
) -> Result<Json<GrantCreditsResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    let request = CreditRequest {
        user_id,
        amount_credits: body.amount_credits,
        kind: CreditKind::AdminAdjust,
        reason: Some(body.reason.clone()),
        request_id: body.request_id,
        payment_intent_id: None,
    };
    let receipt = state.ledger.credit(request)?;

    tracing::info!(
        user_id = %user_id,
        service = %auth.service_name,
        amount_credits = %body.amount_credits,
        reason = %body.reason,
        balance_credits = %receipt.balance_credits,
        "Credits granted"
    );

    Ok(Json(GrantCreditsResponse {
        transaction_id: receipt.transaction.id.to_string(),
        balance_credits: receipt.balance_credits,
        replayed: receipt.replayed,
    }))
}

/// Monthly free-grant request, issued by a scheduler.
#[derive(Debug, Deserialize)]
pub struct MonthlyGrantRequest {
    /// User to replenish.
    pub user_id: String,
}

/// Replenish the user's free monthly credits.
///
/// Keyed by calendar month, so the scheduler may retry freely.
pub async fn grant_monthly_credits(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<MonthlyGrantRequest>,
) -> Result<Json<GrantCreditsResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    let receipt = state.ledger.grant_free_credits(user_id)?;

    if !receipt.replayed {
        tracing::info!(
            user_id = %user_id,
            service = %auth.service_name,
            amount_credits = %receipt.transaction.amount_credits,
            "Monthly credits granted"
        );
    }

    Ok(Json(GrantCreditsResponse {
        transaction_id: receipt.transaction.id.to_string(),
        balance_credits: receipt.balance_credits,
        replayed: receipt.replayed,
    }))
}

/// Audit query parameters.
#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    /// User to audit.
    pub user_id: String,
}

/// Compare the balance counter against the non-expired log sum.
pub async fn audit_balance(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Query(query): Query<AuditQuery>,
) -> Result<Json<vox_billing_ledger::BalanceAudit>, ApiError> {
    let user_id = parse_user_id(&query.user_id)?;
    let audit = state.ledger.reconcile(user_id)?;

    Ok(Json(audit))
}

/// Expiration request, issued by an operator or scheduler.
#[derive(Debug, Deserialize)]
pub struct ExpireCreditsRequest {
    /// User whose lapsed credits should be realized.
    pub user_id: String,
}

/// Expiration response.
#[derive(Debug, Serialize)]
pub struct ExpireCreditsResponse {
    /// The EXPIRATION entry, when anything had lapsed.
    pub transaction_id: Option<String>,
    /// Credits removed by this call.
    pub expired_credits: i64,
    /// Balance after the call.
    pub balance_credits: i64,
}

/// Realize lapsed credit lots as an EXPIRATION debit.
pub async fn expire_credits(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<ExpireCreditsRequest>,
) -> Result<Json<ExpireCreditsResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;

    match state.ledger.expire_credits(user_id)? {
        Some(receipt) => {
            tracing::info!(
                user_id = %user_id,
                service = %auth.service_name,
                expired_credits = %receipt.transaction.amount_credits.abs(),
                balance_credits = %receipt.balance_credits,
                "Lapsed credits expired"
            );
            Ok(Json(ExpireCreditsResponse {
                transaction_id: Some(receipt.transaction.id.to_string()),
                expired_credits: receipt.transaction.amount_credits.abs(),
                balance_credits: receipt.balance_credits,
            }))
        }
        None => {
            let balance_credits = state.ledger.balance(user_id)?;
            Ok(Json(ExpireCreditsResponse {
                transaction_id: None,
                expired_credits: 0,
                balance_credits,
            }))
        }
    }
}

/// Parse a user id from a request body, rejecting malformed input early.
pub(crate) fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse::<UserId>()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))
}
