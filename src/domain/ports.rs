use super::transaction::{Transaction, TransactionStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Result of a conditional status update.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// The stored status matched the expected one and the record was advanced.
    Applied(Transaction),
    /// The stored status did not match; nothing was written.
    /// `current` is the status found, or `None` if no record exists.
    NotApplied { current: Option<TransactionStatus> },
}

/// Durable keyed persistence for transactions.
///
/// Implementations must make `insert` and `update_status` atomic with respect
/// to each other: uniqueness and the status comparison are decided by the
/// store, never by a caller's earlier read.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn find(&self, transaction_id: &str) -> Result<Option<Transaction>>;

    /// Fails with `TransactionError::DuplicateKey` if the id is already stored.
    async fn insert(&self, tx: Transaction) -> Result<Transaction>;

    /// Compare-and-set on the status field.
    async fn update_status(
        &self,
        transaction_id: &str,
        expected: TransactionStatus,
        new: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusUpdate>;
}

/// The slow external confirmation a transaction waits on before settling.
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn confirm(&self, tx: &Transaction) -> Result<()>;
}

pub type SharedTransactionStore = Arc<dyn TransactionStore>;
pub type SharedConfirmation = Arc<dyn Confirmation>;
