//! Account management handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use vox_billing_core::Account;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Current balance in credits.
    pub balance_credits: i64,
    /// Lifetime purchased credits.
    pub lifetime_purchased_credits: i64,
    /// Lifetime granted credits.
    pub lifetime_granted_credits: i64,
    /// Lifetime consumed credits.
    pub lifetime_used_credits: i64,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            balance_credits: account.balance_credits,
            lifetime_purchased_credits: account.lifetime_purchased_credits,
            lifetime_granted_credits: account.lifetime_granted_credits,
            lifetime_used_credits: account.lifetime_used_credits,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Create a new account, seeding the first monthly free grant.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.ledger.create_account(auth.user_id)?;

    tracing::info!(
        user_id = %auth.user_id,
        balance_credits = %account.balance_credits,
        "Account created"
    );

    Ok(Json(AccountResponse::from(&account)))
}

/// Get the current user's account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.ledger.account(auth.user_id)?;

    Ok(Json(AccountResponse::from(&account)))
}
