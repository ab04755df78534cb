use super::recorder::TransactionRecorder;
use crate::domain::ports::{SharedConfirmation, SharedTransactionStore, StatusUpdate};
use crate::domain::transaction::{Transaction, TransactionStatus, TransactionWebhook};
use crate::error::{Result, TransactionError};
use chrono::Utc;
use std::time::Duration;

/// Tuning for the settlement step.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementConfig {
    /// Upper bound on the confirmation wait. `None` waits as long as the
    /// confirmation takes.
    pub confirmation_timeout: Option<Duration>,
}

/// What a single `settle` invocation achieved.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// This invocation performed the PROCESSING -> PROCESSED transition.
    Settled(Transaction),
    /// The record was already terminal; nothing was waited on or written.
    AlreadyProcessed(Transaction),
    /// Another invocation advanced the record while this one was waiting.
    Superseded { current: Option<TransactionStatus> },
}

/// Drives a transaction from `PROCESSING` to `PROCESSED`.
///
/// Concurrent or repeated calls for the same id converge on one effective
/// transition: the status pre-check skips settled records, and the final
/// compare-and-set turns any late finisher into a no-op. No lock is held
/// across the confirmation wait.
#[derive(Clone)]
pub struct SettlementWorkflow {
    recorder: TransactionRecorder,
    store: SharedTransactionStore,
    confirmation: SharedConfirmation,
    config: SettlementConfig,
}

impl SettlementWorkflow {
    pub fn new(
        store: SharedTransactionStore,
        confirmation: SharedConfirmation,
        config: SettlementConfig,
    ) -> Self {
        Self {
            recorder: TransactionRecorder::new(store.clone()),
            store,
            confirmation,
            config,
        }
    }

    pub fn recorder(&self) -> &TransactionRecorder {
        &self.recorder
    }

    pub async fn settle(&self, webhook: TransactionWebhook) -> Result<SettlementOutcome> {
        let tx = self.recorder.record_if_absent(webhook).await?;

        if tx.status != TransactionStatus::Processing {
            tracing::debug!(
                transaction_id = %tx.transaction_id,
                status = %tx.status,
                "already settled, skipping"
            );
            return Ok(SettlementOutcome::AlreadyProcessed(tx));
        }

        self.await_confirmation(&tx).await?;

        let update = self
            .store
            .update_status(
                &tx.transaction_id,
                TransactionStatus::Processing,
                TransactionStatus::Processed,
                Utc::now(),
            )
            .await?;

        match update {
            StatusUpdate::Applied(settled) => {
                tracing::info!(
                    transaction_id = %settled.transaction_id,
                    processed_at = ?settled.processed_at,
                    "transaction processed"
                );
                Ok(SettlementOutcome::Settled(settled))
            }
            StatusUpdate::NotApplied { current } => {
                tracing::debug!(
                    transaction_id = %tx.transaction_id,
                    current = ?current,
                    "transition conflict, another settlement finished first"
                );
                Ok(SettlementOutcome::Superseded { current })
            }
        }
    }

    async fn await_confirmation(&self, tx: &Transaction) -> Result<()> {
        let confirm = self.confirmation.confirm(tx);
        let result = match self.config.confirmation_timeout {
            Some(limit) => match tokio::time::timeout(limit, confirm).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(TransactionError::ExternalWaitFailure {
                        transaction_id: tx.transaction_id.clone(),
                        reason: format!("timed out after {}ms", limit.as_millis()),
                    });
                }
            },
            None => confirm.await,
        };

        result.map_err(|e| match e {
            TransactionError::ExternalWaitFailure { .. } => e,
            other => TransactionError::ExternalWaitFailure {
                transaction_id: tx.transaction_id.clone(),
                reason: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{Confirmation, TransactionStore};
    use crate::domain::transaction::Amount;
    use crate::infrastructure::confirmation::DelayedConfirmation;
    use crate::infrastructure::in_memory::InMemoryTransactionStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn webhook(id: &str) -> TransactionWebhook {
        TransactionWebhook {
            transaction_id: id.to_string(),
            source_account: "A".to_string(),
            destination_account: "B".to_string(),
            amount: Amount::new(dec!(100.00)).unwrap(),
            currency: "USD".to_string(),
        }
    }

    struct Unreachable;

    #[async_trait]
    impl Confirmation for Unreachable {
        async fn confirm(&self, _tx: &Transaction) -> Result<()> {
            Err(TransactionError::Storage("upstream unreachable".to_string()))
        }
    }

    fn workflow(
        store: &InMemoryTransactionStore,
        confirmation: SharedConfirmation,
        config: SettlementConfig,
    ) -> SettlementWorkflow {
        SettlementWorkflow::new(Arc::new(store.clone()), confirmation, config)
    }

    #[tokio::test]
    async fn test_settle_records_and_processes() {
        let store = InMemoryTransactionStore::new();
        let wf = workflow(
            &store,
            Arc::new(DelayedConfirmation::new(Duration::from_millis(1))),
            SettlementConfig::default(),
        );

        let outcome = wf.settle(webhook("tx-1")).await.unwrap();
        let SettlementOutcome::Settled(tx) = outcome else {
            panic!("expected Settled, got {outcome:?}");
        };
        assert_eq!(tx.status, TransactionStatus::Processed);
        assert!(tx.processed_at.unwrap() >= tx.created_at);
        assert_eq!(store.find("tx-1").await.unwrap().unwrap(), tx);
    }

    #[tokio::test]
    async fn test_settle_is_noop_once_processed() {
        let store = InMemoryTransactionStore::new();
        let wf = workflow(
            &store,
            Arc::new(DelayedConfirmation::new(Duration::from_millis(1))),
            SettlementConfig::default(),
        );
        wf.settle(webhook("tx-1")).await.unwrap();
        let settled = store.find("tx-1").await.unwrap().unwrap();

        // A confirmation that always fails proves the wait is skipped entirely.
        let replay = workflow(&store, Arc::new(Unreachable), SettlementConfig::default());
        let outcome = replay.settle(webhook("tx-1")).await.unwrap();

        assert_eq!(outcome, SettlementOutcome::AlreadyProcessed(settled.clone()));
        assert_eq!(store.find("tx-1").await.unwrap().unwrap(), settled);
    }

    #[tokio::test]
    async fn test_failed_confirmation_leaves_processing() {
        let store = InMemoryTransactionStore::new();
        let wf = workflow(&store, Arc::new(Unreachable), SettlementConfig::default());

        let err = wf.settle(webhook("tx-1")).await.unwrap_err();
        assert!(matches!(
            err,
            TransactionError::ExternalWaitFailure { ref transaction_id, .. } if transaction_id == "tx-1"
        ));

        let tx = store.find("tx-1").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Processing);
        assert!(tx.processed_at.is_none());
    }

    #[tokio::test]
    async fn test_confirmation_timeout_is_external_wait_failure() {
        let store = InMemoryTransactionStore::new();
        let wf = workflow(
            &store,
            Arc::new(DelayedConfirmation::new(Duration::from_secs(60))),
            SettlementConfig {
                confirmation_timeout: Some(Duration::from_millis(10)),
            },
        );

        let err = wf.settle(webhook("tx-1")).await.unwrap_err();
        assert!(matches!(err, TransactionError::ExternalWaitFailure { ref reason, .. } if reason.contains("timed out")));
        assert_eq!(
            store.find("tx-1").await.unwrap().unwrap().status,
            TransactionStatus::Processing
        );
    }

    #[tokio::test]
    async fn test_retry_after_failure_settles() {
        let store = InMemoryTransactionStore::new();
        let failing = workflow(&store, Arc::new(Unreachable), SettlementConfig::default());
        assert!(failing.settle(webhook("tx-1")).await.is_err());

        let healthy = workflow(
            &store,
            Arc::new(DelayedConfirmation::new(Duration::from_millis(1))),
            SettlementConfig::default(),
        );
        let outcome = healthy.settle(webhook("tx-1")).await.unwrap();
        assert!(matches!(outcome, SettlementOutcome::Settled(_)));
    }
}
