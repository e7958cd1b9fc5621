//! Payout-date repair jobs
//!
//! `next_payout_date` drifts when payouts are re-anchored to the moment they
//! executed, or when rows were edited by hand. Both jobs recompute it from the
//! pool's start date and rewrite it through the normal mutation path. Every
//! pool is reported individually; one failing pool does not stop the run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::models::Pool;

use crate::domain::{PoolAggregate, schedule};
use crate::error::ServiceResult;
use crate::store::{LedgerStore, Store};

/// Outcome for one pool
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DateRepair {
    pub pool_id: i64,
    pub name: String,
    pub success: bool,
    pub updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Date the pool's current cycle is due, counted from the start date
fn cycle_date(agg: &PoolAggregate) -> Option<DateTime<Utc>> {
    let pool = &agg.pool;
    Some(schedule::next_payout_date(
        pool.start_date,
        pool.frequency,
        pool.current_cycle,
    ))
}

/// Date the current recipient is due, counted from their position
fn recipient_date(agg: &PoolAggregate) -> Option<DateTime<Utc>> {
    let pool = &agg.pool;
    let recipient = agg.active_member(pool.next_payout_member_id.as_deref()?)?;
    Some(schedule::next_payout_date(
        pool.start_date,
        pool.frequency,
        recipient.position,
    ))
}

async fn repair(
    store: &Store,
    pool: &Pool,
    now: DateTime<Utc>,
    target: fn(&PoolAggregate) -> Option<DateTime<Utc>>,
) -> DateRepair {
    let mut report = DateRepair {
        pool_id: pool.id,
        name: pool.name.clone(),
        success: true,
        updated: false,
        old_date: Some(pool.next_payout_date),
        new_date: None,
        error: None,
    };

    let result = store
        .apply(pool.id, |agg, _| {
            let Some(date) = target(agg) else {
                return Ok(None);
            };
            if agg.pool.next_payout_date == date {
                return Ok(Some((date, false)));
            }
            agg.pool.next_payout_date = date;
            agg.pool.updated_at = now;
            Ok(Some((date, true)))
        })
        .await;

    match result {
        Ok(Some((date, updated))) => {
            report.new_date = Some(date);
            report.updated = updated;
            if updated {
                tracing::info!(pool_id = pool.id, old = %pool.next_payout_date, new = %date, "Next payout date repaired");
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(pool_id = pool.id, error = %e, "Failed to repair next payout date");
            report.success = false;
            report.error = Some(e.to_string());
        }
    }
    report
}

async fn open_pools(store: &Store, pool_id: Option<i64>) -> ServiceResult<Vec<Pool>> {
    let pools = store.list_pools().await?;
    Ok(pools
        .into_iter()
        .filter(|p| !p.status.is_terminal() && pool_id.is_none_or(|id| id == p.id))
        .collect())
}

/// Reset every open pool's next payout date to `start + current_cycle × period`
pub async fn update_pool_dates(store: &Store, now: DateTime<Utc>) -> ServiceResult<Vec<DateRepair>> {
    let pools = open_pools(store, None).await?;
    tracing::info!(pools = pools.len(), "Updating pool payout dates");
    let mut results = Vec::with_capacity(pools.len());
    for pool in &pools {
        results.push(repair(store, pool, now, cycle_date).await);
    }
    Ok(results)
}

/// Align next payout dates with the current recipient's position
pub async fn fix_member_payout_dates(
    store: &Store,
    pool_id: Option<i64>,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<DateRepair>> {
    let pools = open_pools(store, pool_id).await?;
    tracing::info!(pools = pools.len(), "Fixing member payout dates");
    let mut results = Vec::with_capacity(pools.len());
    for pool in &pools {
        results.push(repair(store, pool, now, recipient_date).await);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::sample_aggregate;
    use crate::store::MemoryStore;
    use chrono::Duration;

    async fn store_with(agg: &PoolAggregate) -> Store {
        let store = Store::Memory(MemoryStore::new());
        store.insert_pool(agg).await.unwrap();
        store
    }

    #[tokio::test]
    async fn update_pool_dates_resets_drift() {
        let mut agg = sample_aggregate(2);
        let correct = agg.pool.next_payout_date;
        agg.pool.next_payout_date = correct + Duration::days(3);
        let store = store_with(&agg).await;

        let results = update_pool_dates(&store, Utc::now()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].updated);
        assert_eq!(results[0].new_date, Some(correct));

        let again = update_pool_dates(&store, Utc::now()).await.unwrap();
        assert!(again[0].success);
        assert!(!again[0].updated);
    }

    #[tokio::test]
    async fn fix_member_dates_follows_recipient_position() {
        let mut agg = sample_aggregate(3);
        agg.pool.next_payout_member_id = Some("user-3".into());
        let store = store_with(&agg).await;

        let results = fix_member_payout_dates(&store, Some(agg.pool.id), Utc::now())
            .await
            .unwrap();
        assert_eq!(
            results[0].new_date,
            Some(agg.pool.start_date + Duration::days(21))
        );
        let stored = store.load_pool(agg.pool.id).await.unwrap().unwrap();
        assert_eq!(stored.pool.next_payout_date, agg.pool.start_date + Duration::days(21));

        assert!(fix_member_payout_dates(&store, Some(1), Utc::now())
            .await
            .unwrap()
            .is_empty());
    }
}
