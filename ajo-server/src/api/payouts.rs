//! Payout endpoints
//!
//! `POST /payout` is two-phase. Without a transaction signature it returns
//! the transfer the creator has to sign from the escrow; with one it verifies
//! and finalizes. `serverSigned: true` lets the server sign with its own key.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::Serialize;
use shared::error::AppError;
use shared::models::{PayoutConfirm, PayoutQuote, PayoutReceipt, PayoutRequest};

use crate::auth::Identity;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, AppError>;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PayoutResponse {
    Quote(PayoutQuote),
    Receipt(Box<PayoutReceipt>),
}

/// POST /api/pools/{id}/payout
pub async fn payout(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(pool_id): Path<i64>,
    Json(req): Json<PayoutRequest>,
) -> ApiResult<PayoutResponse> {
    let user_id = identity.user_id.as_str();
    let response = match req.transaction_signature.as_deref() {
        Some(signature) => PayoutResponse::Receipt(Box::new(
            state
                .pools
                .execute_payout(pool_id, user_id, signature)
                .await?,
        )),
        None if req.server_signed => {
            PayoutResponse::Receipt(Box::new(state.pools.submit_payout(pool_id, user_id).await?))
        }
        None => PayoutResponse::Quote(state.pools.prepare_payout(pool_id, user_id).await?),
    };
    Ok(Json(response))
}

/// POST /api/pools/{id}/payout/confirm
pub async fn confirm(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(pool_id): Path<i64>,
    Json(req): Json<PayoutConfirm>,
) -> ApiResult<PayoutReceipt> {
    let receipt = state
        .pools
        .execute_payout(pool_id, &identity.user_id, &req.transaction_signature)
        .await?;
    Ok(Json(receipt))
}
