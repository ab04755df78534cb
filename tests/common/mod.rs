#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use txsettle::domain::ports::{Confirmation, TransactionStore};
use txsettle::domain::transaction::{Amount, Transaction, TransactionStatus, TransactionWebhook};
use txsettle::error::{Result, TransactionError};

pub fn webhook(id: &str, amount: Decimal) -> TransactionWebhook {
    TransactionWebhook {
        transaction_id: id.to_string(),
        source_account: "A".to_string(),
        destination_account: "B".to_string(),
        amount: Amount::new(amount).unwrap(),
        currency: "USD".to_string(),
    }
}

/// A confirmation that blocks until the test opens the gate.
pub struct GatedConfirmation {
    gate: Semaphore,
    entered: AtomicUsize,
}

impl GatedConfirmation {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            entered: AtomicUsize::new(0),
        })
    }

    /// Lets `n` waiting (or future) confirmations through.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Blocks until at least `n` confirmations have started waiting.
    pub async fn wait_entered(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.entered() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("confirmations never started");
    }
}

#[async_trait]
impl Confirmation for GatedConfirmation {
    async fn confirm(&self, _tx: &Transaction) -> Result<()> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| TransactionError::Storage(e.to_string()))?;
        permit.forget();
        Ok(())
    }
}

/// Polls the store until the record reaches `status`.
pub async fn wait_for_status(
    store: &dyn TransactionStore,
    transaction_id: &str,
    status: TransactionStatus,
) -> Transaction {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(tx) = store.find(transaction_id).await.unwrap()
                && tx.status == status
            {
                return tx;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("transaction never reached expected status")
}
