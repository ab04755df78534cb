use crate::domain::ports::{StatusUpdate, TransactionStore};
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::error::{Result, TransactionError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for transactions.
///
/// Uses `Arc<RwLock<HashMap<String, Transaction>>>` for shared concurrent access.
/// `insert` and `update_status` hold the write lock across their check and write,
/// so uniqueness and the status comparison are atomic.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<String, Transaction>>>,
}

impl InMemoryTransactionStore {
    /// Creates a new, empty in-memory transaction store.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.transactions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transactions.read().await.is_empty()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn find(&self, transaction_id: &str) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(transaction_id).cloned())
    }

    async fn insert(&self, tx: Transaction) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;
        match transactions.entry(tx.transaction_id.clone()) {
            Entry::Occupied(_) => Err(TransactionError::DuplicateKey(tx.transaction_id)),
            Entry::Vacant(slot) => Ok(slot.insert(tx).clone()),
        }
    }

    async fn update_status(
        &self,
        transaction_id: &str,
        expected: TransactionStatus,
        new: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusUpdate> {
        TransactionStatus::ensure_transition(expected, new)?;

        let mut transactions = self.transactions.write().await;
        let Some(tx) = transactions.get_mut(transaction_id) else {
            return Ok(StatusUpdate::NotApplied { current: None });
        };
        if tx.status != expected {
            return Ok(StatusUpdate::NotApplied {
                current: Some(tx.status),
            });
        }

        tx.apply_transition(new, at)?;
        Ok(StatusUpdate::Applied(tx.clone()))
    }
}
