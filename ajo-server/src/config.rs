//! Server configuration

use std::time::Duration;

use crate::domain::PayoutAnchor;
use crate::domain::schedule::DEFAULT_GRACE_PERIOD_DAYS;
use crate::error::BoxError;

const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";

/// ajo server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL, or `memory://` for the in-process store
    pub database_url: String,
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    /// HS256 secret for user and admin tokens
    pub jwt_secret: String,
    /// Payment-rail JSON-RPC endpoint
    pub solana_rpc_url: String,
    /// Default escrow for pools created without their own address
    pub program_address: Option<String>,
    /// Server signing key, encoded (env: SIGNING_KEY) or file path (env: SIGNING_KEY_PATH)
    pub signing_key: Option<String>,
    pub signing_key_path: Option<String>,
    pub grace_period_days: i64,
    pub payout_anchor: PayoutAnchor,
    pub confirmation_poll: Duration,
    pub confirmation_timeout: Duration,
    pub reconcile_interval: Duration,
}

impl Config {
    /// Require a secret: must be set and non-empty in non-development environments.
    fn require_secret(
        var: &impl Fn(&str) -> Option<String>,
        name: &str,
        environment: &str,
    ) -> Result<String, BoxError> {
        let val = match var(name) {
            Some(v) => v,
            None => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable source
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, BoxError> {
        let environment = var("ENVIRONMENT").unwrap_or_else(|| "development".into());
        let non_empty = |name: &str| var(name).filter(|s| !s.trim().is_empty());
        let number = |name: &str, default: u64| -> Result<u64, BoxError> {
            match non_empty(name) {
                Some(v) => v
                    .trim()
                    .parse()
                    .map_err(|_| format!("{name} must be a non-negative integer, got {v:?}").into()),
                None => Ok(default),
            }
        };

        let payout_anchor = match non_empty("PAYOUT_ANCHOR") {
            Some(v) => PayoutAnchor::parse(v.trim())
                .ok_or_else(|| format!("PAYOUT_ANCHOR must be rolling or schedule, got {v:?}"))?,
            None => PayoutAnchor::default(),
        };

        let confirmation_poll = Duration::from_millis(number("CONFIRMATION_POLL_MS", 2000)?);
        if confirmation_poll.is_zero() {
            return Err("CONFIRMATION_POLL_MS must be greater than zero".into());
        }

        Ok(Self {
            database_url: var("DATABASE_URL").ok_or("DATABASE_URL must be set")?,
            http_port: var("HTTP_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            environment: environment.clone(),
            jwt_secret: Self::require_secret(&var, "JWT_SECRET", &environment)?,
            solana_rpc_url: non_empty("SOLANA_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.into()),
            program_address: non_empty("PROGRAM_ADDRESS"),
            signing_key: non_empty("SIGNING_KEY"),
            signing_key_path: non_empty("SIGNING_KEY_PATH"),
            grace_period_days: number("GRACE_PERIOD_DAYS", DEFAULT_GRACE_PERIOD_DAYS as u64)?
                as i64,
            payout_anchor,
            confirmation_poll,
            confirmation_timeout: Duration::from_secs(number("CONFIRMATION_TIMEOUT_SECS", 60)?),
            reconcile_interval: Duration::from_secs(number("RECONCILE_INTERVAL_SECS", 60)?.max(1)),
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory://")
    }
}
