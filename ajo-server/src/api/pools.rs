//! Pool endpoints: create, read, edit, cancel, join

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::error::AppError;
use shared::models::{
    FeeBreakdown, JoinPool, Member, MemberPosition, Pool, PoolCreate, PoolDetail, PoolUpdate,
};

use crate::auth::{Caller, Identity};
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, AppError>;

/// POST /api/pools
pub async fn create_pool(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<PoolCreate>,
) -> ApiResult<Pool> {
    let pool = state
        .pools
        .create_pool(&identity.user_id, identity.wallet_address.as_deref(), req)
        .await?;
    Ok(Json(pool))
}

/// GET /api/pools: pools the caller is an active member of
pub async fn list_pools(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Vec<Pool>> {
    Ok(Json(state.pools.user_pools(&identity.user_id).await?))
}

/// GET /api/pools/{id}
pub async fn get_pool(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(pool_id): Path<i64>,
) -> ApiResult<PoolDetail> {
    Ok(Json(state.pools.pool_detail(pool_id, caller.user_id()).await?))
}

/// PUT /api/pools/{id}
pub async fn update_pool(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(pool_id): Path<i64>,
    Json(update): Json<PoolUpdate>,
) -> ApiResult<Pool> {
    let pool = state
        .pools
        .update_pool(pool_id, &identity.user_id, update)
        .await?;
    Ok(Json(pool))
}

/// DELETE /api/pools/{id}: cancels the pool; rows are kept
pub async fn cancel_pool(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(pool_id): Path<i64>,
) -> ApiResult<Pool> {
    Ok(Json(state.pools.cancel_pool(pool_id, &identity.user_id).await?))
}

/// POST /api/pools/{id}/join
pub async fn join_pool(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(pool_id): Path<i64>,
    Json(req): Json<JoinPool>,
) -> ApiResult<Member> {
    let member = state
        .pools
        .join_pool(
            pool_id,
            &identity.user_id,
            identity.wallet_address.as_deref(),
            req.position,
        )
        .await?;
    Ok(Json(member))
}

/// GET /api/pools/{id}/position
pub async fn position(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(pool_id): Path<i64>,
) -> ApiResult<MemberPosition> {
    Ok(Json(
        state.pools.user_position(pool_id, &identity.user_id).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct FeeQuery {
    pub amount: Option<String>,
}

/// GET /api/pools/{id}/fees?amount=
pub async fn fees(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(pool_id): Path<i64>,
    Query(query): Query<FeeQuery>,
) -> ApiResult<FeeBreakdown> {
    let amount = query
        .amount
        .as_deref()
        .map(|raw| {
            raw.trim()
                .parse::<Decimal>()
                .map_err(|_| AppError::validation(format!("amount is not a number: {raw}")))
        })
        .transpose()?;
    Ok(Json(
        state
            .pools
            .fee_preview(pool_id, &identity.user_id, amount)
            .await?,
    ))
}
