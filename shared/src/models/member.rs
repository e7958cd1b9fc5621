//! Member Model (pool membership record)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Membership status; members are soft-removed, never deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Removed,
}

impl MemberStatus {
    /// Parse from database string value (lowercase)
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }

    /// Database string representation (lowercase)
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Removed => "removed",
        }
    }
}

/// One row per (pool, user)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: i64,
    pub pool_id: i64,
    pub user_id: String,
    /// 1-based payout order
    pub position: i32,
    pub has_received_payout: bool,
    pub total_contributed: Decimal,
    pub last_contribution_date: Option<DateTime<Utc>>,
    /// Cycle of the member's most recent confirmed contribution
    pub last_contribution_cycle: Option<i32>,
    pub status: MemberStatus,
    pub joined_at: DateTime<Utc>,
}

impl Member {
    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

/// Join pool payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPool {
    pub position: Option<i32>,
}

/// Caller's place in the rotation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberPosition {
    pub position: i32,
    pub has_received_payout: bool,
    pub projected_payout_date: DateTime<Utc>,
    pub is_next_recipient: bool,
}
