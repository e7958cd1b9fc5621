//! Premium status endpoint

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;
use shared::error::{AppError, ErrorCode};

use crate::auth::Identity;
use crate::domain::premium::{SubscriptionStatus, subscription_status};
use crate::state::AppState;
use crate::store::LedgerStore;

type ApiResult<T> = Result<Json<T>, AppError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub pool_id: Option<i64>,
}

/// GET /api/premium/status?poolId=
pub async fn status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<SubscriptionStatus> {
    let user = state.store.get_user(&identity.user_id).await?;
    let pool = match query.pool_id {
        Some(pool_id) => Some(
            state
                .store
                .load_pool(pool_id)
                .await?
                .ok_or_else(|| {
                    AppError::with_message(
                        ErrorCode::PoolNotFound,
                        format!("Pool {pool_id} not found"),
                    )
                })?
                .pool,
        ),
        None => None,
    };
    Ok(Json(subscription_status(
        user.as_ref(),
        pool.as_ref(),
        state.clock.now(),
    )))
}
