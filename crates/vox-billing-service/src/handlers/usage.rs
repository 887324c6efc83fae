//! Usage estimation and metering handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use vox_billing_core::Modality;
use vox_billing_ledger::ChargeUsageRequest;

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::handlers::credits::parse_user_id;
use crate::state::AppState;

/// Estimate request.
#[derive(Debug, Deserialize)]
pub struct EstimateRequest {
    /// Billable modality ("TTS" or "STT").
    pub modality: Modality,
    /// Input size: characters for TTS, seconds for STT.
    pub input_size: f64,
}

/// Estimate response.
#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    /// The modality that was priced.
    pub modality: Modality,
    /// The input size that was priced.
    pub input_size: f64,
    /// Whole credits the usage would cost.
    pub credits: i64,
}

/// Estimate the credit cost of a unit of usage without charging it.
///
/// Non-billable sizes (zero or negative) estimate to zero credits rather
/// than erroring; only an actual charge insists on a positive size.
pub async fn estimate_usage(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Json(body): Json<EstimateRequest>,
) -> Result<Json<EstimateResponse>, ApiError> {
    let credits = state.config.pricing.estimate(body.modality, body.input_size);

    Ok(Json(EstimateResponse {
        modality: body.modality,
        input_size: body.input_size,
        credits,
    }))
}

/// Metered charge request from a speech worker.
#[derive(Debug, Deserialize)]
pub struct ChargeRequest {
    /// User being charged.
    pub user_id: String,
    /// Billable modality ("TTS" or "STT").
    pub modality: Modality,
    /// Input size: characters for TTS, seconds for STT.
    pub input_size: f64,
    /// Idempotency key; resending charges once.
    pub request_id: Option<String>,
    /// Extra key/value pairs recorded in the transaction description.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Metered charge response.
#[derive(Debug, Serialize)]
pub struct ChargeResponse {
    /// The deduction entry.
    pub transaction_id: String,
    /// Whole credits deducted.
    pub credits: i64,
    /// Balance after the deduction.
    pub balance_credits: i64,
    /// Whether an earlier request already applied this charge.
    pub replayed: bool,
}

/// Estimate and deduct the cost of completed usage.
pub async fn charge_usage(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<ChargeRequest>,
) -> Result<Json<ChargeResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    let request = ChargeUsageRequest {
        user_id,
        modality: body.modality,
        input_size: body.input_size,
        request_id: body.request_id,
        metadata: body.metadata,
    };
    let receipt = state.ledger.charge_usage(request)?;
    let credits = receipt.transaction.amount_credits.abs();

    tracing::info!(
        user_id = %user_id,
        service = %auth.service_name,
        modality = %body.modality,
        input_size = %body.input_size,
        credits = %credits,
        balance_credits = %receipt.balance_credits,
        replayed = %receipt.replayed,
        "Usage charged"
    );

    Ok(Json(ChargeResponse {
        transaction_id: receipt.transaction.id.to_string(),
        credits,
        balance_credits: receipt.balance_credits,
        replayed: receipt.replayed,
    }))
}
