//! Access-control predicates
//!
//! Pure and total: an absent user (unauthenticated caller) is never
//! granted anything.

use super::PoolAggregate;

pub fn is_creator(user_id: Option<&str>, pool: &PoolAggregate) -> bool {
    user_id.is_some_and(|u| u == pool.pool.creator_id)
}

pub fn is_member(user_id: Option<&str>, pool: &PoolAggregate) -> bool {
    user_id.is_some_and(|u| pool.active_member(u).is_some())
}

/// Terms are editable only until someone besides the creator joins
pub fn can_edit(user_id: Option<&str>, pool: &PoolAggregate) -> bool {
    is_creator(user_id, pool) && pool.pool.current_members <= 1
}

pub fn can_delete(user_id: Option<&str>, pool: &PoolAggregate) -> bool {
    can_edit(user_id, pool)
}

pub fn can_contribute(user_id: Option<&str>, pool: &PoolAggregate) -> bool {
    is_member(user_id, pool)
}

pub fn can_vote(user_id: Option<&str>, pool: &PoolAggregate) -> bool {
    is_member(user_id, pool)
}

pub fn can_create_proposal(user_id: Option<&str>, pool: &PoolAggregate) -> bool {
    is_member(user_id, pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::sample_aggregate;
    use shared::models::MemberStatus;

    #[test]
    fn anonymous_gets_nothing() {
        let agg = sample_aggregate(1);
        assert!(!is_creator(None, &agg));
        assert!(!is_member(None, &agg));
        assert!(!can_edit(None, &agg));
        assert!(!can_vote(None, &agg));
    }

    #[test]
    fn creator_can_edit_until_someone_joins() {
        let agg = sample_aggregate(1);
        assert!(can_edit(Some("user-1"), &agg));
        assert!(can_delete(Some("user-1"), &agg));

        let agg = sample_aggregate(2);
        assert!(is_creator(Some("user-1"), &agg));
        assert!(!can_edit(Some("user-1"), &agg));
        assert!(!can_edit(Some("user-2"), &agg));
    }

    #[test]
    fn removed_members_lose_membership_rights() {
        let mut agg = sample_aggregate(3);
        assert!(can_contribute(Some("user-3"), &agg));
        agg.member_mut("user-3").unwrap().status = MemberStatus::Removed;
        assert!(!can_contribute(Some("user-3"), &agg));
        assert!(!can_create_proposal(Some("user-3"), &agg));
        assert!(!is_member(Some("stranger"), &agg));
    }
}
