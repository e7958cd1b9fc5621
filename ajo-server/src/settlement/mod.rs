//! Settlement adapter
//!
//! The payment rail is consumed through three operations: submit a transfer,
//! look up a transfer by its reference, and read a balance. Nothing is
//! recorded until [`Settlement::verify`] has seen the transfer confirmed with
//! the expected destination and amount. Waiting is bounded: the rail is
//! polled every `poll` until `timeout`, after which the outcome is
//! [`SettlementError::Timeout`] and the reference is left for reconciliation.

pub mod memory;
pub mod solana;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};

use crate::error::ServiceError;

pub use memory::InMemoryRail;
pub use solana::{SolanaRail, native_token};

/// On-ledger view of one transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferStatus {
    pub confirmed: bool,
    pub amount: Decimal,
    pub source: Option<String>,
    pub destination: Option<String>,
    /// Ledger error if the transfer landed but failed
    pub err: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("transfer rejected: {0}")]
    Rejected(String),

    #[error("transfer amount {actual} does not cover the expected {expected}")]
    AmountMismatch { expected: Decimal, actual: Decimal },

    #[error("transfer went to {actual} instead of {expected}")]
    DestinationMismatch { expected: String, actual: String },

    #[error("transfer came from {actual} instead of {expected}")]
    SourceMismatch { expected: String, actual: String },

    #[error("balance {available} is below the required {required}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    #[error("transfer {settlement_ref} not confirmed within {waited:?}")]
    Timeout {
        settlement_ref: String,
        waited: Duration,
    },

    #[error("payment rail unavailable: {0}")]
    Rail(String),

    #[error("server signing unavailable: {0}")]
    Signing(String),
}

impl From<SettlementError> for AppError {
    fn from(e: SettlementError) -> Self {
        let code = match &e {
            SettlementError::Rejected(_)
            | SettlementError::DestinationMismatch { .. }
            | SettlementError::SourceMismatch { .. } => {
                ErrorCode::SettlementVerificationFailed
            }
            SettlementError::AmountMismatch { .. } => ErrorCode::SettlementAmountMismatch,
            SettlementError::InsufficientBalance { .. } => ErrorCode::InsufficientPoolBalance,
            SettlementError::Timeout { .. } => ErrorCode::ConfirmationTimeout,
            SettlementError::Rail(_) => ErrorCode::PaymentRailUnavailable,
            SettlementError::Signing(_) => ErrorCode::SigningUnavailable,
        };
        AppError::new(code).with_details(e.to_string())
    }
}

impl From<SettlementError> for ServiceError {
    fn from(e: SettlementError) -> Self {
        ServiceError::App(e.into())
    }
}

#[async_trait]
pub trait PaymentRail: Send + Sync {
    /// Sign and submit a transfer with the server key; returns the transfer reference.
    /// `from` must be the address the server key controls when given.
    async fn submit_transfer(
        &self,
        from: Option<&str>,
        to: &str,
        amount: Decimal,
    ) -> Result<String, SettlementError>;

    /// `None` while the ledger has not seen the reference
    async fn verify_transfer(
        &self,
        settlement_ref: &str,
    ) -> Result<Option<TransferStatus>, SettlementError>;

    async fn get_balance(&self, address: &str) -> Result<Decimal, SettlementError>;
}

/// What a transfer has to look like to count
#[derive(Debug, Clone)]
pub struct ExpectedTransfer<'a> {
    /// Sender the transfer must come from
    pub source: Option<&'a str>,
    pub destination: Option<&'a str>,
    /// Minimum amount the transfer must carry
    pub amount: Decimal,
}

impl ExpectedTransfer<'_> {
    pub fn check(&self, status: &TransferStatus) -> Result<(), SettlementError> {
        if let Some(err) = &status.err {
            return Err(SettlementError::Rejected(err.clone()));
        }
        if !status.confirmed {
            return Err(SettlementError::Rejected("transfer is not confirmed".into()));
        }
        // A party the ledger does not report counts as a mismatch.
        if let Some(expected) = self.source {
            let actual = status.source.as_deref().unwrap_or("an unknown sender");
            if expected != actual {
                return Err(SettlementError::SourceMismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        if let Some(expected) = self.destination {
            let actual = status.destination.as_deref().unwrap_or("an unknown recipient");
            if expected != actual {
                return Err(SettlementError::DestinationMismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        if status.amount < self.amount {
            return Err(SettlementError::AmountMismatch {
                expected: self.amount,
                actual: status.amount,
            });
        }
        Ok(())
    }
}

/// Rail handle with the confirmation policy applied
#[derive(Clone)]
pub struct Settlement {
    rail: Arc<dyn PaymentRail>,
    poll: Duration,
    timeout: Duration,
}

impl Settlement {
    pub fn new(rail: Arc<dyn PaymentRail>, poll: Duration, timeout: Duration) -> Self {
        Self {
            rail,
            poll,
            timeout,
        }
    }

    pub fn rail(&self) -> &Arc<dyn PaymentRail> {
        &self.rail
    }

    /// Poll until the ledger reports the transfer confirmed or failed
    pub async fn await_confirmation(
        &self,
        settlement_ref: &str,
    ) -> Result<TransferStatus, SettlementError> {
        let started = tokio::time::Instant::now();
        loop {
            if let Some(status) = self.rail.verify_transfer(settlement_ref).await?
                && (status.err.is_some() || status.confirmed)
            {
                return Ok(status);
            }
            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(SettlementError::Timeout {
                    settlement_ref: settlement_ref.to_string(),
                    waited,
                });
            }
            tracing::debug!(settlement_ref, ?waited, "Transfer not confirmed yet");
            tokio::time::sleep(self.poll.min(self.timeout - waited)).await;
        }
    }

    /// Wait for confirmation, then check the transfer against `expected`
    pub async fn verify(
        &self,
        settlement_ref: &str,
        expected: &ExpectedTransfer<'_>,
    ) -> Result<TransferStatus, SettlementError> {
        let status = self.await_confirmation(settlement_ref).await?;
        expected.check(&status)?;
        Ok(status)
    }

    /// Single non-blocking lookup, used by the reconciliation worker
    pub async fn lookup(
        &self,
        settlement_ref: &str,
    ) -> Result<Option<TransferStatus>, SettlementError> {
        self.rail.verify_transfer(settlement_ref).await
    }

    pub async fn balance(&self, address: &str) -> Result<Decimal, SettlementError> {
        self.rail.get_balance(address).await
    }

    /// Fail with `InsufficientBalance` unless `address` holds at least `required`
    pub async fn ensure_balance(
        &self,
        address: &str,
        required: Decimal,
    ) -> Result<Decimal, SettlementError> {
        let available = self.balance(address).await?;
        if available < required {
            return Err(SettlementError::InsufficientBalance {
                required,
                available,
            });
        }
        Ok(available)
    }

    pub async fn submit(
        &self,
        from: Option<&str>,
        to: &str,
        amount: Decimal,
    ) -> Result<String, SettlementError> {
        self.rail.submit_transfer(from, to, amount).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn confirmed(amount: Decimal, destination: &str) -> TransferStatus {
        TransferStatus {
            confirmed: true,
            amount,
            source: Some("payer".into()),
            destination: Some(destination.into()),
            err: None,
        }
    }

    fn settlement(rail: Arc<InMemoryRail>) -> Settlement {
        Settlement::new(rail, Duration::from_millis(10), Duration::from_millis(50))
    }

    #[test]
    fn check_accepts_covering_transfer() {
        let expected = ExpectedTransfer {
            source: Some("payer"),
            destination: Some("escrow"),
            amount: d("10"),
        };
        assert!(expected.check(&confirmed(d("10"), "escrow")).is_ok());
        assert!(expected.check(&confirmed(d("12.5"), "escrow")).is_ok());
    }

    #[test]
    fn check_rejects_short_misdirected_or_foreign_transfer() {
        let expected = ExpectedTransfer {
            source: Some("payer"),
            destination: Some("escrow"),
            amount: d("10"),
        };
        assert!(matches!(
            expected.check(&confirmed(d("9.99"), "escrow")),
            Err(SettlementError::AmountMismatch { .. })
        ));
        assert!(matches!(
            expected.check(&confirmed(d("10"), "elsewhere")),
            Err(SettlementError::DestinationMismatch { .. })
        ));

        let mut foreign = confirmed(d("10"), "escrow");
        foreign.source = Some("someone-else".into());
        assert!(matches!(
            expected.check(&foreign),
            Err(SettlementError::SourceMismatch { .. })
        ));
        foreign.source = None;
        assert!(matches!(
            expected.check(&foreign),
            Err(SettlementError::SourceMismatch { .. })
        ));

        let mut failed = confirmed(d("10"), "escrow");
        failed.err = Some("InstructionError".into());
        assert!(matches!(
            expected.check(&failed),
            Err(SettlementError::Rejected(_))
        ));
    }

    #[test]
    fn error_codes() {
        let timeout: AppError = SettlementError::Timeout {
            settlement_ref: "abc".into(),
            waited: Duration::from_secs(60),
        }
        .into();
        assert_eq!(timeout.code, ErrorCode::ConfirmationTimeout);

        let short: AppError = SettlementError::AmountMismatch {
            expected: d("10"),
            actual: d("1"),
        }
        .into();
        assert_eq!(short.code, ErrorCode::SettlementAmountMismatch);
        assert!(short.details.is_some());

        let foreign: AppError = SettlementError::SourceMismatch {
            expected: "alice-wallet".into(),
            actual: "mallory-wallet".into(),
        }
        .into();
        assert_eq!(foreign.code, ErrorCode::SettlementVerificationFailed);
    }

    #[tokio::test]
    async fn unknown_reference_times_out() {
        let rail = Arc::new(InMemoryRail::new());
        let err = settlement(rail).await_confirmation("missing").await.unwrap_err();
        assert!(matches!(err, SettlementError::Timeout { .. }));
    }

    #[tokio::test]
    async fn pending_transfer_confirms_while_polling() {
        let rail = Arc::new(InMemoryRail::new());
        rail.record_pending("sig-1", "payer", "escrow", d("10"));
        let s = Settlement::new(
            rail.clone(),
            Duration::from_millis(5),
            Duration::from_secs(5),
        );

        let confirm = {
            let rail = rail.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                rail.confirm("sig-1");
            })
        };

        let status = s
            .verify(
                "sig-1",
                &ExpectedTransfer {
                    source: Some("payer"),
                    destination: Some("escrow"),
                    amount: d("10"),
                },
            )
            .await
            .unwrap();
        assert!(status.confirmed);
        confirm.await.unwrap();
    }

    #[tokio::test]
    async fn ensure_balance_reports_shortfall() {
        let rail = Arc::new(InMemoryRail::new());
        rail.set_balance("escrow", d("20"));
        let s = settlement(rail);
        assert_eq!(s.ensure_balance("escrow", d("20")).await.unwrap(), d("20"));
        assert!(matches!(
            s.ensure_balance("escrow", d("30")).await,
            Err(SettlementError::InsufficientBalance { .. })
        ));
    }
}
