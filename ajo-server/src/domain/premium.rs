//! Premium tier limits and feature gates
//!
//! Premium status is persisted as an expiry timestamp on the user and on
//! the pool; it is active while the expiry lies in the future.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::{Pool, User};

pub const MIN_POOL_MEMBERS: i32 = 2;
pub const STANDARD_MAX_POOL_MEMBERS: i32 = 20;
pub const PREMIUM_MAX_POOL_MEMBERS: i32 = 100;

pub const USER_PREMIUM_MONTHLY_PRICE: u32 = 500;
pub const POOL_PREMIUM_MONTHLY_PRICE: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PremiumFeature {
    YieldFarming,
    LargePool,
    CustomGovernance,
    ReducedFees,
}

impl PremiumFeature {
    pub const ALL: [PremiumFeature; 4] = [
        Self::YieldFarming,
        Self::LargePool,
        Self::CustomGovernance,
        Self::ReducedFees,
    ];
}

pub fn is_premium_user(user: Option<&User>, now: DateTime<Utc>) -> bool {
    user.is_some_and(|u| u.is_premium_at(now))
}

pub fn max_pool_members(is_premium: bool) -> i32 {
    if is_premium {
        PREMIUM_MAX_POOL_MEMBERS
    } else {
        STANDARD_MAX_POOL_MEMBERS
    }
}

/// Pool size check: `2..=100` overall, above 20 only with premium
pub fn check_capacity(total_members: i32, is_premium: bool) -> Result<(), AppError> {
    if !(MIN_POOL_MEMBERS..=PREMIUM_MAX_POOL_MEMBERS).contains(&total_members) {
        return Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            format!(
                "Pool size must be between {MIN_POOL_MEMBERS} and {PREMIUM_MAX_POOL_MEMBERS} members"
            ),
        ));
    }
    if total_members > max_pool_members(is_premium) {
        return Err(AppError::with_message(
            ErrorCode::PremiumRequired,
            format!("Pools larger than {STANDARD_MAX_POOL_MEMBERS} members require premium"),
        ));
    }
    Ok(())
}

/// Pool features follow the pool's premium status, fee discounts follow the user's
pub fn is_feature_available(
    feature: PremiumFeature,
    user: Option<&User>,
    pool: Option<&Pool>,
    now: DateTime<Utc>,
) -> bool {
    match feature {
        PremiumFeature::YieldFarming
        | PremiumFeature::LargePool
        | PremiumFeature::CustomGovernance => pool.is_some_and(|p| p.is_premium_at(now)),
        PremiumFeature::ReducedFees => is_premium_user(user, now),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub user_is_premium: bool,
    pub pool_is_premium: bool,
    pub user_premium_until: Option<DateTime<Utc>>,
    pub pool_premium_until: Option<DateTime<Utc>>,
    pub user_premium_price: u32,
    pub pool_premium_price: u32,
    pub features: Vec<FeatureAvailability>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureAvailability {
    pub feature: PremiumFeature,
    pub available: bool,
}

pub fn subscription_status(
    user: Option<&User>,
    pool: Option<&Pool>,
    now: DateTime<Utc>,
) -> SubscriptionStatus {
    SubscriptionStatus {
        user_is_premium: is_premium_user(user, now),
        pool_is_premium: pool.is_some_and(|p| p.is_premium_at(now)),
        user_premium_until: user.and_then(|u| u.premium_until),
        pool_premium_until: pool.and_then(|p| p.premium_until),
        user_premium_price: USER_PREMIUM_MONTHLY_PRICE,
        pool_premium_price: POOL_PREMIUM_MONTHLY_PRICE,
        features: PremiumFeature::ALL
            .iter()
            .map(|&feature| FeatureAvailability {
                feature,
                available: is_feature_available(feature, user, pool, now),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::{sample_pool, sample_user};
    use chrono::Duration;

    #[test]
    fn capacity_bounds() {
        assert!(check_capacity(2, false).is_ok());
        assert!(check_capacity(20, false).is_ok());
        assert_eq!(
            check_capacity(21, false).unwrap_err().code,
            ErrorCode::PremiumRequired
        );
        assert!(check_capacity(100, true).is_ok());
        assert_eq!(
            check_capacity(101, true).unwrap_err().code,
            ErrorCode::ValueOutOfRange
        );
        assert_eq!(
            check_capacity(1, true).unwrap_err().code,
            ErrorCode::ValueOutOfRange
        );
    }

    #[test]
    fn premium_expires() {
        let now = Utc::now();
        let mut user = sample_user("u");
        assert!(!is_premium_user(Some(&user), now));

        user.premium_until = Some(now + Duration::days(30));
        assert!(is_premium_user(Some(&user), now));
        assert!(!is_premium_user(Some(&user), now + Duration::days(31)));
        assert!(!is_premium_user(None, now));
    }

    #[test]
    fn pool_size_ceiling() {
        assert_eq!(max_pool_members(false), 20);
        assert_eq!(max_pool_members(true), 100);
    }

    #[test]
    fn feature_gates_split_by_owner() {
        let now = Utc::now();
        let mut user = sample_user("u");
        user.premium_until = Some(now + Duration::days(1));
        let pool = sample_pool();

        assert!(is_feature_available(PremiumFeature::ReducedFees, Some(&user), None, now));
        assert!(!is_feature_available(PremiumFeature::LargePool, Some(&user), Some(&pool), now));

        let status = subscription_status(Some(&user), Some(&pool), now);
        assert!(status.user_is_premium);
        assert!(!status.pool_is_premium);
        assert_eq!(status.features.len(), 4);
    }
}
