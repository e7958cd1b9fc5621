//! Application state

use std::sync::Arc;

use crate::config::Config;
use crate::domain::{Clock, SystemClock};
use crate::error::BoxError;
use crate::governance::GovernanceManager;
use crate::lifecycle::{LedgerPolicy, PoolManager};
use crate::settlement::solana::SigningKey;
use crate::settlement::{InMemoryRail, PaymentRail, Settlement, SolanaRail};
use crate::store::{MemoryStore, PgStore, Store};

/// Shared state for all request handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub pools: Arc<PoolManager>,
    pub governance: Arc<GovernanceManager>,
    pub clock: Arc<dyn Clock>,
    /// JWT secret for user and admin tokens
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let store = if config.uses_memory_store() {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Store::Memory(MemoryStore::new())
        } else {
            Store::Postgres(PgStore::connect(&config.database_url).await?)
        };

        let rail: Arc<dyn PaymentRail> = if config.uses_memory_store() {
            Arc::new(InMemoryRail::new())
        } else {
            let signer = match (&config.signing_key, &config.signing_key_path) {
                (Some(encoded), _) => Some(SigningKey::from_encoded(encoded)?),
                (None, Some(path)) => Some(SigningKey::from_file(path)?),
                (None, None) => None,
            };
            match &signer {
                Some(key) => tracing::info!(address = key.address(), "Server signing enabled"),
                None => tracing::info!("No signing key configured; server-signed payouts disabled"),
            }
            Arc::new(SolanaRail::new(config.solana_rpc_url.clone(), signer))
        };

        let settlement = Settlement::new(rail, config.confirmation_poll, config.confirmation_timeout);
        let policy = LedgerPolicy {
            grace_period_days: config.grace_period_days,
            payout_anchor: config.payout_anchor,
            default_escrow: config.program_address.clone(),
        };

        Ok(Self::from_parts(
            Arc::new(store),
            settlement,
            Arc::new(SystemClock),
            policy,
            &config.jwt_secret,
        ))
    }

    /// Wire the managers over an existing store, rail and clock
    pub fn from_parts(
        store: Arc<Store>,
        settlement: Settlement,
        clock: Arc<dyn Clock>,
        policy: LedgerPolicy,
        jwt_secret: &str,
    ) -> Self {
        let pools = Arc::new(PoolManager::new(
            store.clone(),
            settlement.clone(),
            clock.clone(),
            policy,
        ));
        let governance = Arc::new(GovernanceManager::new(
            store.clone(),
            settlement,
            clock.clone(),
        ));
        Self {
            store,
            pools,
            governance,
            clock,
            jwt_secret: Arc::from(jwt_secret),
        }
    }
}
