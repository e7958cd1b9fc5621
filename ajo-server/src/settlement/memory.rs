//! In-process payment rail
//!
//! Keeps transfers and balances in memory. Used by the in-memory deployment
//! mode and by tests, which drive confirmation by hand.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;

use super::{PaymentRail, SettlementError, TransferStatus};

#[derive(Default)]
pub struct InMemoryRail {
    transfers: DashMap<String, TransferStatus>,
    balances: DashMap<String, Decimal>,
    /// Address the "server key" controls; `None` disables submission
    signer: Option<String>,
    next_ref: AtomicU64,
}

impl InMemoryRail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signer(address: impl Into<String>) -> Self {
        Self {
            signer: Some(address.into()),
            ..Self::default()
        }
    }

    pub fn set_balance(&self, address: &str, amount: Decimal) {
        self.balances.insert(address.to_string(), amount);
    }

    pub fn balance_of(&self, address: &str) -> Decimal {
        self.balances.get(address).map(|b| *b).unwrap_or_default()
    }

    /// A confirmed transfer; balances move immediately
    pub fn record_transfer(&self, settlement_ref: &str, from: &str, to: &str, amount: Decimal) {
        self.move_funds(from, to, amount);
        self.transfers.insert(
            settlement_ref.to_string(),
            TransferStatus {
                confirmed: true,
                amount,
                source: Some(from.to_string()),
                destination: Some(to.to_string()),
                err: None,
            },
        );
    }

    /// A transfer the ledger has seen but not confirmed; funds move on [`confirm`](Self::confirm)
    pub fn record_pending(&self, settlement_ref: &str, from: &str, to: &str, amount: Decimal) {
        self.transfers.insert(
            settlement_ref.to_string(),
            TransferStatus {
                confirmed: false,
                amount,
                source: Some(from.to_string()),
                destination: Some(to.to_string()),
                err: None,
            },
        );
    }

    pub fn confirm(&self, settlement_ref: &str) {
        let moved = self.transfers.get_mut(settlement_ref).and_then(|mut t| {
            if t.confirmed || t.err.is_some() {
                return None;
            }
            t.confirmed = true;
            Some((t.source.clone(), t.destination.clone(), t.amount))
        });
        if let Some((Some(from), Some(to), amount)) = moved {
            self.move_funds(&from, &to, amount);
        }
    }

    pub fn fail(&self, settlement_ref: &str, reason: &str) {
        if let Some(mut t) = self.transfers.get_mut(settlement_ref) {
            t.err = Some(reason.to_string());
        }
    }

    fn move_funds(&self, from: &str, to: &str, amount: Decimal) {
        // one shard guard at a time
        if let Some(mut balance) = self.balances.get_mut(from) {
            *balance -= amount;
        }
        *self.balances.entry(to.to_string()).or_default() += amount;
    }
}

#[async_trait]
impl PaymentRail for InMemoryRail {
    async fn submit_transfer(
        &self,
        from: Option<&str>,
        to: &str,
        amount: Decimal,
    ) -> Result<String, SettlementError> {
        let signer = self
            .signer
            .as_deref()
            .ok_or_else(|| SettlementError::Signing("no signing key configured".into()))?;
        if from.is_some_and(|f| f != signer) {
            return Err(SettlementError::Signing(format!(
                "signing key does not control {}",
                from.unwrap_or_default()
            )));
        }

        let available = self.balance_of(signer);
        if available < amount {
            return Err(SettlementError::InsufficientBalance {
                required: amount,
                available,
            });
        }

        let settlement_ref = format!("mem-{}", self.next_ref.fetch_add(1, Ordering::Relaxed) + 1);
        self.record_transfer(&settlement_ref, signer, to, amount);
        Ok(settlement_ref)
    }

    async fn verify_transfer(
        &self,
        settlement_ref: &str,
    ) -> Result<Option<TransferStatus>, SettlementError> {
        Ok(self.transfers.get(settlement_ref).map(|t| t.clone()))
    }

    async fn get_balance(&self, address: &str) -> Result<Decimal, SettlementError> {
        Ok(self.balance_of(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn confirmed_transfer_moves_funds_once() {
        let rail = InMemoryRail::new();
        rail.set_balance("alice", d("50"));
        rail.record_pending("sig", "alice", "escrow", d("10"));
        assert_eq!(rail.balance_of("escrow"), Decimal::ZERO);

        rail.confirm("sig");
        rail.confirm("sig");
        assert_eq!(rail.balance_of("alice"), d("40"));
        assert_eq!(rail.balance_of("escrow"), d("10"));

        let status = rail.verify_transfer("sig").await.unwrap().unwrap();
        assert!(status.confirmed);
        assert!(rail.verify_transfer("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn submit_requires_matching_signer_and_funds() {
        let rail = InMemoryRail::with_signer("escrow");
        rail.set_balance("escrow", d("30"));

        assert!(matches!(
            rail.submit_transfer(Some("someone"), "bob", d("1")).await,
            Err(SettlementError::Signing(_))
        ));
        assert!(matches!(
            rail.submit_transfer(None, "bob", d("31")).await,
            Err(SettlementError::InsufficientBalance { .. })
        ));

        let sig = rail.submit_transfer(Some("escrow"), "bob", d("30")).await.unwrap();
        assert_eq!(rail.balance_of("bob"), d("30"));
        assert_eq!(rail.balance_of("escrow"), Decimal::ZERO);
        assert!(rail.verify_transfer(&sig).await.unwrap().unwrap().confirmed);
    }

    #[tokio::test]
    async fn submit_without_signer_is_unavailable() {
        let rail = InMemoryRail::new();
        assert!(matches!(
            rail.submit_transfer(None, "bob", d("1")).await,
            Err(SettlementError::Signing(_))
        ));
    }
}
