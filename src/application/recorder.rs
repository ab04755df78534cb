use crate::domain::ports::SharedTransactionStore;
use crate::domain::transaction::{Transaction, TransactionWebhook};
use crate::error::{Result, TransactionError};
use chrono::Utc;

/// Ensures a single stored record per `transaction_id`.
#[derive(Clone)]
pub struct TransactionRecorder {
    store: SharedTransactionStore,
}

impl TransactionRecorder {
    pub fn new(store: SharedTransactionStore) -> Self {
        Self { store }
    }

    /// Returns the stored record for the webhook's id, creating it on first sight.
    ///
    /// The preliminary `find` only short-circuits the common duplicate-delivery
    /// case. Uniqueness is decided by the store's `insert`: losing that race
    /// yields `DuplicateKey`, which is answered with the winner's record.
    /// The original payload is never overwritten.
    pub async fn record_if_absent(&self, webhook: TransactionWebhook) -> Result<Transaction> {
        if let Some(existing) = self.store.find(&webhook.transaction_id).await? {
            tracing::debug!(
                transaction_id = %existing.transaction_id,
                status = %existing.status,
                "duplicate delivery, returning existing record"
            );
            return Ok(existing);
        }

        let transaction_id = webhook.transaction_id.clone();
        match self
            .store
            .insert(Transaction::from_webhook(webhook, Utc::now()))
            .await
        {
            Ok(created) => {
                tracing::info!(
                    transaction_id = %created.transaction_id,
                    amount = %created.amount.value(),
                    currency = %created.currency,
                    "transaction recorded"
                );
                Ok(created)
            }
            Err(TransactionError::DuplicateKey(_)) => {
                tracing::debug!(%transaction_id, "lost insert race, re-reading winner");
                let winner = self.store.find(&transaction_id).await?;
                winner.ok_or(TransactionError::NotFound(transaction_id))
            }
            Err(e) => Err(e),
        }
    }
}
