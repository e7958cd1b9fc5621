//! API routes for ajo-server

pub mod admin;
pub mod contributions;
pub mod health;
pub mod payouts;
pub mod pools;
pub mod premium;
pub mod proposals;

use axum::routing::{get, post};
use axum::{Router, middleware};
use tower_http::trace::TraceLayer;

use crate::auth::{admin_middleware, optional_auth_middleware, user_auth_middleware};
use crate::state::AppState;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Pool detail is readable without a token
    let public_read = Router::new()
        .route("/api/pools/{id}", get(pools::get_pool))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            optional_auth_middleware,
        ));

    // Member API (user JWT)
    let member = Router::new()
        .route("/api/pools", post(pools::create_pool).get(pools::list_pools))
        .route(
            "/api/pools/{id}",
            axum::routing::put(pools::update_pool).delete(pools::cancel_pool),
        )
        .route("/api/pools/{id}/join", post(pools::join_pool))
        .route("/api/pools/{id}/position", get(pools::position))
        .route("/api/pools/{id}/fees", get(pools::fees))
        .route(
            "/api/pools/{id}/contribute",
            get(contributions::prepare).post(contributions::contribute),
        )
        .route("/api/pools/{id}/payout", post(payouts::payout))
        .route("/api/pools/{id}/payout/confirm", post(payouts::confirm))
        .route(
            "/api/pools/{id}/proposals",
            post(proposals::create).get(proposals::list),
        )
        .route("/api/proposal/{id}/vote", post(proposals::vote))
        .route("/api/proposal/{id}/execute", post(proposals::execute))
        .route("/api/proposal/{id}/cancel", post(proposals::cancel))
        .route("/api/premium/status", get(premium::status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            user_auth_middleware,
        ));

    // Admin API (admin service token)
    let admin = Router::new()
        .route(
            "/api/admin/update-pool-dates",
            post(admin::update_pool_dates),
        )
        .route(
            "/api/admin/fix-member-payout-dates",
            post(admin::fix_member_payout_dates),
        )
        .route("/api/admin/premium", post(admin::grant_premium))
        .route("/api/admin/reconcile", post(admin::reconcile))
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            user_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(public_read)
        .merge(member)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
