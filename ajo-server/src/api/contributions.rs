//! Contribution endpoints

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use shared::error::AppError;
use shared::models::{Contribution, ContributionCreate, ContributionQuote};

use crate::auth::Identity;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, AppError>;

/// GET /api/pools/{id}/contribute: transfer the caller has to sign
pub async fn prepare(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(pool_id): Path<i64>,
) -> ApiResult<ContributionQuote> {
    Ok(Json(
        state
            .pools
            .prepare_contribution(pool_id, &identity.user_id)
            .await?,
    ))
}

/// POST /api/pools/{id}/contribute: record a signed, submitted transfer
pub async fn contribute(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(pool_id): Path<i64>,
    Json(req): Json<ContributionCreate>,
) -> ApiResult<Contribution> {
    let contribution = state
        .pools
        .record_contribution(pool_id, &identity.user_id, req)
        .await?;
    Ok(Json(contribution))
}
