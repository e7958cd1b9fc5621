//! Settlement bookkeeping shared by contributions and payouts

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Confirmation state of a transfer on the payment rail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Pending,
    Confirmed,
    Failed,
}

impl SettlementStatus {
    /// Parse from database string value (lowercase)
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Database string representation (lowercase)
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

/// What an unconfirmed transfer was meant to settle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementKind {
    Contribution,
    Payout,
}

impl SettlementKind {
    /// Parse from database string value (lowercase)
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "contribution" => Some(Self::Contribution),
            "payout" => Some(Self::Payout),
            _ => None,
        }
    }

    /// Database string representation (lowercase)
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Contribution => "contribution",
            Self::Payout => "payout",
        }
    }
}

/// A transfer whose confirmation timed out, awaiting reconciliation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingSettlement {
    pub settlement_ref: String,
    pub kind: SettlementKind,
    pub pool_id: i64,
    /// Contributor for contributions, requester for payouts
    pub user_id: String,
    pub amount: Decimal,
    pub status: SettlementStatus,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
}
