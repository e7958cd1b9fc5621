//! Governance endpoints

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use shared::error::AppError;
use shared::models::{
    ExecutionResult, Proposal, ProposalCreate, ProposalWithTally, VoteCast, VoteTally,
};

use crate::auth::Identity;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, AppError>;

/// POST /api/pools/{id}/proposals
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(pool_id): Path<i64>,
    Json(req): Json<ProposalCreate>,
) -> ApiResult<Proposal> {
    let proposal = state
        .governance
        .create_proposal(pool_id, &identity.user_id, req)
        .await?;
    Ok(Json(proposal))
}

/// GET /api/pools/{id}/proposals
pub async fn list(
    State(state): State<AppState>,
    Path(pool_id): Path<i64>,
) -> ApiResult<Vec<ProposalWithTally>> {
    Ok(Json(state.governance.list_proposals(pool_id).await?))
}

/// POST /api/proposal/{id}/vote
pub async fn vote(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(proposal_id): Path<i64>,
    Json(cast): Json<VoteCast>,
) -> ApiResult<VoteTally> {
    let tally = state
        .governance
        .vote(proposal_id, &identity.user_id, cast)
        .await?;
    Ok(Json(tally))
}

/// POST /api/proposal/{id}/execute
pub async fn execute(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(proposal_id): Path<i64>,
) -> ApiResult<ExecutionResult> {
    Ok(Json(
        state
            .governance
            .execute_proposal(proposal_id, &identity.user_id)
            .await?,
    ))
}

/// POST /api/proposal/{id}/cancel
pub async fn cancel(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(proposal_id): Path<i64>,
) -> ApiResult<Proposal> {
    Ok(Json(
        state
            .governance
            .cancel_proposal(proposal_id, &identity.user_id)
            .await?,
    ))
}
