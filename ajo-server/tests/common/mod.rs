#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ajo_server::AppState;
use ajo_server::domain::FixedClock;
use ajo_server::lifecycle::LedgerPolicy;
use ajo_server::settlement::{InMemoryRail, Settlement};
use ajo_server::store::{MemoryStore, Store};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use shared::models::{ContributionCreate, Pool, PoolCreate};

pub const ESCROW: &str = "escrow-wallet";
pub const JWT_SECRET: &str = "test-jwt-secret";

pub fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn wallet(user_id: &str) -> String {
    format!("{user_id}-wallet")
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
}

pub struct Harness {
    pub state: AppState,
    pub rail: Arc<InMemoryRail>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_rail(InMemoryRail::with_signer(ESCROW))
    }

    pub fn with_rail(rail: InMemoryRail) -> Self {
        let rail = Arc::new(rail);
        let clock = Arc::new(FixedClock::new(t0()));
        let settlement = Settlement::new(
            rail.clone(),
            Duration::from_millis(2),
            Duration::from_millis(20),
        );
        let state = AppState::from_parts(
            Arc::new(Store::Memory(MemoryStore::new())),
            settlement,
            clock.clone(),
            LedgerPolicy::default(),
            JWT_SECRET,
        );
        Self { state, rail, clock }
    }

    pub fn memory_store(&self) -> &MemoryStore {
        match &*self.state.store {
            Store::Memory(m) => m,
            Store::Postgres(_) => unreachable!("harness always uses the memory store"),
        }
    }

    pub fn pool_request(total_members: i32) -> PoolCreate {
        PoolCreate {
            name: "Market Women Ajo".into(),
            description: Some("weekly savings".into()),
            contribution_amount: d("10"),
            contribution_token: "SOL".into(),
            contribution_token_symbol: None,
            frequency: "weekly".into(),
            total_members,
            start_date: t0(),
            end_date: t0() + chrono::Duration::days(90),
            yield_enabled: false,
            pool_address: Some(ESCROW.into()),
        }
    }

    pub async fn create_pool(&self, creator: &str, total_members: i32) -> Pool {
        self.state
            .pools
            .create_pool(creator, Some(&wallet(creator)), Self::pool_request(total_members))
            .await
            .unwrap()
    }

    /// Pool with `members` already joined in position order; `members[0]` creates it
    pub async fn full_pool(&self, members: &[&str]) -> Pool {
        let pool = self.create_pool(members[0], members.len() as i32).await;
        for user in &members[1..] {
            self.state
                .pools
                .join_pool(pool.id, user, Some(&wallet(user)), None)
                .await
                .unwrap();
        }
        pool
    }

    /// Send `amount` from the member's wallet to the escrow and record it
    pub async fn contribute(
        &self,
        pool_id: i64,
        user_id: &str,
        signature: &str,
        amount: Decimal,
    ) -> Result<shared::models::Contribution, ajo_server::error::ServiceError> {
        self.rail.set_balance(&wallet(user_id), d("1000"));
        self.rail
            .record_transfer(signature, &wallet(user_id), ESCROW, amount);
        self.state
            .pools
            .record_contribution(
                pool_id,
                user_id,
                ContributionCreate {
                    amount,
                    transaction_signature: signature.into(),
                },
            )
            .await
    }
}
