//! Pool Model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Contribution cadence of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl Frequency {
    /// Parse from database string value (lowercase)
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "biweekly" => Some(Self::Biweekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    /// Database string representation (lowercase)
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
        }
    }
}

/// Pool lifecycle status
///
/// `pending -> active -> completed`, with `cancelled` reachable from
/// `pending` or `active`. No transition leads back to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    /// Below capacity, waiting for members
    Pending,
    /// Capacity reached, rotation running
    Active,
    /// Every member received a payout
    Completed,
    /// Terminal escape state
    Cancelled,
}

impl PoolStatus {
    /// Parse from database string value (lowercase)
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Database string representation (lowercase)
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled pools accept no further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: PoolStatus) -> bool {
        use PoolStatus::*;
        matches!(
            (self, next),
            (Pending, Active) | (Active, Completed) | (Pending, Cancelled) | (Active, Cancelled)
        )
    }
}

/// Pool entity (rotating savings circle)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub creator_id: String,
    pub contribution_amount: Decimal,
    pub contribution_token: String,
    pub contribution_token_symbol: String,
    pub frequency: Frequency,
    pub total_members: i32,
    pub current_members: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_contributed: Decimal,
    pub next_payout_date: DateTime<Utc>,
    /// User id of the member due to receive the next payout
    pub next_payout_member_id: Option<String>,
    /// 1-based rotation cycle currently collecting contributions
    pub current_cycle: i32,
    pub status: PoolStatus,
    pub yield_enabled: bool,
    /// Escrow address on the payment rail holding contributions
    pub pool_address: Option<String>,
    pub premium_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pool {
    /// Payout owed to the current recipient: one contribution from every
    /// active member. This follows `current_members`, not `total_members`,
    /// so a pool that lost a member to governance still pays out what was
    /// actually collected. `None` if the product overflows.
    pub fn expected_payout(&self) -> Option<Decimal> {
        self.contribution_amount.checked_mul(Decimal::from(self.current_members))
    }

    pub fn is_premium_at(&self, now: DateTime<Utc>) -> bool {
        self.premium_until.is_some_and(|until| until > now)
    }
}

/// Create pool payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolCreate {
    pub name: String,
    pub description: Option<String>,
    pub contribution_amount: Decimal,
    pub contribution_token: String,
    pub contribution_token_symbol: Option<String>,
    /// daily | weekly | biweekly | monthly
    pub frequency: String,
    pub total_members: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub yield_enabled: bool,
    pub pool_address: Option<String>,
}

/// Update pool payload (creator only, before anyone else joins)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub contribution_amount: Option<Decimal>,
    pub frequency: Option<String>,
    pub total_members: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub yield_enabled: Option<bool>,
}

/// Pool as seen by one caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDetail {
    pub pool: Pool,
    pub members: Vec<super::Member>,
    pub is_member: bool,
    pub is_creator: bool,
    pub can_edit: bool,
    /// The caller's own contributions
    pub contributions: Vec<super::Contribution>,
    /// The caller's own penalties
    pub penalties: Vec<super::Penalty>,
    pub payouts: Vec<super::Payout>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_db_roundtrip() {
        for f in [
            Frequency::Daily,
            Frequency::Weekly,
            Frequency::Biweekly,
            Frequency::Monthly,
        ] {
            assert_eq!(Frequency::from_db(f.as_db()), Some(f));
        }
        assert_eq!(Frequency::from_db("yearly"), None);
    }

    #[test]
    fn test_status_transitions_are_one_directional() {
        use PoolStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(Active.can_transition_to(Cancelled));
        assert!(!Active.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(Completed.is_terminal());
        assert!(!Active.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PoolStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }

    #[test]
    fn test_expected_payout_counts_active_members() {
        let now = Utc::now();
        let mut pool = Pool {
            id: 1,
            name: "Pool".into(),
            slug: "pool".into(),
            description: None,
            creator_id: "alice".into(),
            contribution_amount: Decimal::new(25, 1),
            contribution_token: "SOL".into(),
            contribution_token_symbol: "SOL".into(),
            frequency: Frequency::Weekly,
            total_members: 4,
            current_members: 3,
            start_date: now,
            end_date: now,
            total_contributed: Decimal::ZERO,
            next_payout_date: now,
            next_payout_member_id: None,
            current_cycle: 1,
            status: PoolStatus::Active,
            yield_enabled: false,
            pool_address: None,
            premium_until: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(pool.expected_payout(), Some(Decimal::new(75, 1)));

        pool.contribution_amount = Decimal::MAX;
        assert_eq!(pool.expected_payout(), None);
    }
}
