//! User Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User identity as provided by the authentication provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub wallet_address: Option<String>,
    pub display_name: Option<String>,
    pub premium_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_premium_at(&self, now: DateTime<Utc>) -> bool {
        self.premium_until.is_some_and(|until| until > now)
    }
}

/// Grant premium status to a user or a pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum PremiumGrant {
    User { user_id: String, until: DateTime<Utc> },
    Pool { pool_id: i64, until: DateTime<Utc> },
}
