use super::settlement::SettlementWorkflow;
use crate::domain::transaction::TransactionWebhook;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Scheduled,
    /// A settlement task for this id is still running in this process.
    AlreadyInFlight,
}

/// Runs settlements on background tokio tasks, detached from the caller.
///
/// Offers no retries and no ordering. At most one task per `transaction_id`
/// runs at a time within this process; correctness across processes still
/// rests on the store's compare-and-set.
#[derive(Clone)]
pub struct SettlementDispatcher {
    workflow: SettlementWorkflow,
    in_flight: Arc<Mutex<HashSet<String>>>,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

/// Clears the in-flight marker when the task ends, however it ends.
struct InFlightGuard {
    transaction_id: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.transaction_id);
    }
}

/// Logs a panicked settlement task. Returns `true` if it panicked.
fn report_join(joined: std::result::Result<(), JoinError>) -> bool {
    match joined {
        Err(e) if e.is_panic() => {
            tracing::error!(error = %e, "settlement task panicked");
            true
        }
        _ => false,
    }
}

// A panicking settlement task must not wedge every later dispatch.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SettlementDispatcher {
    pub fn new(workflow: SettlementWorkflow) -> Self {
        Self {
            workflow,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn workflow(&self) -> &SettlementWorkflow {
        &self.workflow
    }

    /// Schedules `settle` for the webhook and returns without waiting for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, webhook: TransactionWebhook) -> DispatchOutcome {
        let transaction_id = webhook.transaction_id.clone();
        if !lock(&self.in_flight).insert(transaction_id.clone()) {
            tracing::debug!(%transaction_id, "settlement already in flight");
            return DispatchOutcome::AlreadyInFlight;
        }
        let guard = InFlightGuard {
            transaction_id: transaction_id.clone(),
            in_flight: self.in_flight.clone(),
        };

        let workflow = self.workflow.clone();
        let span = tracing::info_span!("settlement", transaction_id = %transaction_id);
        let task = async move {
            let _guard = guard;
            if let Err(e) = workflow.settle(webhook).await {
                tracing::error!(error = %e, "settlement failed, record left in PROCESSING");
            }
        };

        self.reap_finished();
        lock(&self.tasks).spawn(task.instrument(span));
        DispatchOutcome::Scheduled
    }

    /// Collects tasks that already finished. Returns how many of them panicked.
    fn reap_finished(&self) -> usize {
        let mut tasks = lock(&self.tasks);
        let mut panicked = 0;
        while let Some(joined) = tasks.try_join_next() {
            if report_join(joined) {
                panicked += 1;
            }
        }
        panicked
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Waits up to `timeout` for every scheduled settlement to finish.
    ///
    /// Returns how many were still running at the deadline. Those are detached,
    /// not aborted, and their records stay `PROCESSING` until they complete.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let mut tasks = std::mem::take(&mut *lock(&self.tasks));

        let finished = tokio::time::timeout(timeout, async {
            while let Some(joined) = tasks.join_next().await {
                report_join(joined);
            }
        })
        .await;

        match finished {
            Ok(()) => 0,
            Err(_) => {
                let remaining = tasks.len();
                tracing::warn!(remaining, "drain deadline reached, detaching settlements");
                tasks.detach_all();
                remaining
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::settlement::SettlementConfig;
    use crate::domain::ports::{Confirmation, TransactionStore};
    use crate::domain::transaction::{Amount, Transaction, TransactionStatus};
    use crate::error::Result;
    use async_trait::async_trait;
    use crate::infrastructure::confirmation::DelayedConfirmation;
    use crate::infrastructure::in_memory::InMemoryTransactionStore;
    use rust_decimal_macros::dec;

    fn webhook(id: &str) -> TransactionWebhook {
        TransactionWebhook {
            transaction_id: id.to_string(),
            source_account: "A".to_string(),
            destination_account: "B".to_string(),
            amount: Amount::new(dec!(10.00)).unwrap(),
            currency: "EUR".to_string(),
        }
    }

    fn dispatcher(store: &InMemoryTransactionStore, delay: Duration) -> SettlementDispatcher {
        let workflow = SettlementWorkflow::new(
            Arc::new(store.clone()),
            Arc::new(DelayedConfirmation::new(delay)),
            SettlementConfig::default(),
        );
        SettlementDispatcher::new(workflow)
    }

    #[tokio::test]
    async fn test_dispatch_returns_before_settlement() {
        let store = InMemoryTransactionStore::new();
        let dispatcher = dispatcher(&store, Duration::from_millis(200));

        assert_eq!(dispatcher.dispatch(webhook("tx-1")), DispatchOutcome::Scheduled);
        assert_eq!(dispatcher.in_flight(), 1);

        assert_eq!(dispatcher.drain(Duration::from_secs(5)).await, 0);
        assert_eq!(dispatcher.in_flight(), 0);
        let tx = store.find("tx-1").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Processed);
    }

    #[tokio::test]
    async fn test_duplicate_dispatch_while_in_flight_is_skipped() {
        let store = InMemoryTransactionStore::new();
        let dispatcher = dispatcher(&store, Duration::from_millis(100));

        assert_eq!(dispatcher.dispatch(webhook("tx-1")), DispatchOutcome::Scheduled);
        assert_eq!(
            dispatcher.dispatch(webhook("tx-1")),
            DispatchOutcome::AlreadyInFlight
        );
        assert_eq!(dispatcher.dispatch(webhook("tx-2")), DispatchOutcome::Scheduled);

        dispatcher.drain(Duration::from_secs(5)).await;

        // Marker released, so a later delivery is scheduled again (and no-ops).
        assert_eq!(dispatcher.dispatch(webhook("tx-1")), DispatchOutcome::Scheduled);
        dispatcher.drain(Duration::from_secs(5)).await;
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_drain_deadline_detaches_remaining() {
        let store = InMemoryTransactionStore::new();
        let dispatcher = dispatcher(&store, Duration::from_secs(60));

        dispatcher.dispatch(webhook("tx-slow"));
        let remaining = dispatcher.drain(Duration::from_millis(20)).await;

        assert_eq!(remaining, 1);
        let tx = store.find("tx-slow").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Processing);
    }

    struct PanickingConfirmation;

    #[async_trait]
    impl Confirmation for PanickingConfirmation {
        async fn confirm(&self, _tx: &Transaction) -> Result<()> {
            panic!("confirmation backend blew up");
        }
    }

    #[tokio::test]
    async fn test_panicked_settlement_is_reported_when_reaped() {
        let store = InMemoryTransactionStore::new();
        let workflow = SettlementWorkflow::new(
            Arc::new(store.clone()),
            Arc::new(PanickingConfirmation),
            SettlementConfig::default(),
        );
        let dispatcher = SettlementDispatcher::new(workflow);

        dispatcher.dispatch(webhook("tx-boom"));

        let mut panicked = 0;
        tokio::time::timeout(Duration::from_secs(5), async {
            while panicked == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                panicked += dispatcher.reap_finished();
            }
        })
        .await
        .expect("panicked task was never reaped");

        assert_eq!(panicked, 1);
        assert_eq!(dispatcher.in_flight(), 0);
        let tx = store.find("tx-boom").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Processing);

        // A later dispatch still goes through after the panic.
        assert_eq!(dispatcher.dispatch(webhook("tx-boom")), DispatchOutcome::Scheduled);
    }
}
