//! Pool aggregate: the pool row together with its membership

use shared::models::{Member, Pool};

/// Unit of consistency for every pool mutation
#[derive(Debug, Clone, PartialEq)]
pub struct PoolAggregate {
    pub pool: Pool,
    pub members: Vec<Member>,
}

impl PoolAggregate {
    pub fn new(pool: Pool, members: Vec<Member>) -> Self {
        Self { pool, members }
    }

    pub fn member(&self, user_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn member_mut(&mut self, user_id: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.user_id == user_id)
    }

    pub fn active_member(&self, user_id: &str) -> Option<&Member> {
        self.member(user_id).filter(|m| m.is_active())
    }

    /// Active members in payout order
    pub fn active_by_position(&self) -> Vec<&Member> {
        let mut active: Vec<&Member> = self.members.iter().filter(|m| m.is_active()).collect();
        active.sort_by_key(|m| m.position);
        active
    }

    pub fn position_taken(&self, position: i32) -> bool {
        self.members
            .iter()
            .any(|m| m.is_active() && m.position == position)
    }

    /// Default slot for a new member: `current_members + 1`, or the lowest
    /// free slot if that one is occupied.
    pub fn next_free_position(&self) -> i32 {
        let preferred = self.pool.current_members + 1;
        if !self.position_taken(preferred) {
            return preferred;
        }
        (1..)
            .find(|p| !self.position_taken(*p))
            .unwrap_or(preferred)
    }

    /// Next recipient after `current_user`: the first active, unpaid member
    /// whose position follows the current one, wrapping around.
    pub fn successor_of(&self, current_user: &str) -> Option<&Member> {
        let ordered = self.active_by_position();
        if ordered.is_empty() {
            return None;
        }
        let current_position = self.member(current_user).map(|m| m.position).unwrap_or(0);
        let start = ordered
            .iter()
            .position(|m| m.position > current_position)
            .unwrap_or(0);
        (0..ordered.len())
            .map(|i| ordered[(start + i) % ordered.len()])
            .find(|m| !m.has_received_payout && m.user_id != current_user)
    }
}
