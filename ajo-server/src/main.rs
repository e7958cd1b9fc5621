//! ajo-server: savings pool API
//!
//! Long-running service that:
//! - Serves the pool, contribution, payout and governance API (JWT authenticated)
//! - Verifies transfers against the Solana payment rail before recording them
//! - Reconciles transfers whose confirmation timed out

use ajo_server::reconcile::Reconciler;
use ajo_server::{AppState, Config, api};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ajo_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting ajo-server (env: {})", config.environment);

    // Initialize application state
    let state = AppState::new(&config).await?;

    // Reconcile transfers parked after a confirmation timeout
    let reconciler = Reconciler::new(state.pools.clone()).spawn(config.reconcile_interval);

    let app = api::create_router(state);

    // Start HTTP server
    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("ajo-server HTTP listening on {http_addr}");

    let http_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, app).await {
            tracing::error!("HTTP server error: {e}");
        }
    });

    http_handle.await?;
    reconciler.abort();

    Ok(())
}
