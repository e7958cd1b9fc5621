//! Admin endpoints (admin service token required)

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::PremiumGrant;

use crate::maintenance::{self, DateRepair};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::state::AppState;
use crate::store::LedgerStore;

type ApiResult<T> = Result<Json<T>, AppError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairResponse {
    pub success: bool,
    pub updated: usize,
    pub results: Vec<DateRepair>,
}

impl From<Vec<DateRepair>> for RepairResponse {
    fn from(results: Vec<DateRepair>) -> Self {
        Self {
            success: results.iter().all(|r| r.success),
            updated: results.iter().filter(|r| r.updated).count(),
            results,
        }
    }
}

/// POST /api/admin/update-pool-dates
pub async fn update_pool_dates(State(state): State<AppState>) -> ApiResult<RepairResponse> {
    let results = maintenance::update_pool_dates(&state.store, state.clock.now()).await?;
    Ok(Json(results.into()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixDatesRequest {
    #[serde(default)]
    pub pool_id: Option<i64>,
}

/// POST /api/admin/fix-member-payout-dates
pub async fn fix_member_payout_dates(
    State(state): State<AppState>,
    Json(req): Json<FixDatesRequest>,
) -> ApiResult<RepairResponse> {
    let results =
        maintenance::fix_member_payout_dates(&state.store, req.pool_id, state.clock.now()).await?;
    Ok(Json(results.into()))
}

/// POST /api/admin/premium
pub async fn grant_premium(
    State(state): State<AppState>,
    Json(grant): Json<PremiumGrant>,
) -> ApiResult<PremiumGrant> {
    match &grant {
        PremiumGrant::User { user_id, until } => {
            if user_id.trim().is_empty() {
                return Err(AppError::validation("userId is required"));
            }
            state.store.ensure_user(user_id, None).await?;
            if !state.store.set_user_premium(user_id, *until).await? {
                return Err(AppError::new(ErrorCode::UserNotFound));
            }
            tracing::info!(user_id = %user_id, %until, "User premium granted");
        }
        PremiumGrant::Pool { pool_id, until } => {
            if !state.store.set_pool_premium(*pool_id, *until).await? {
                return Err(AppError::with_message(
                    ErrorCode::PoolNotFound,
                    format!("Pool {pool_id} not found"),
                ));
            }
            tracing::info!(pool_id = *pool_id, %until, "Pool premium granted");
        }
    }
    Ok(Json(grant))
}

/// POST /api/admin/reconcile: run one reconciliation pass now
pub async fn reconcile(State(state): State<AppState>) -> ApiResult<ReconcileReport> {
    let report = Reconciler::new(state.pools.clone()).run_once().await?;
    Ok(Json(report))
}
