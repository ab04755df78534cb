use crate::domain::ports::Confirmation;
use crate::domain::transaction::Transaction;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Default stand-in for the external confirmation call.
pub const DEFAULT_CONFIRMATION_DELAY: Duration = Duration::from_secs(30);

/// Confirms every transaction after a fixed delay.
#[derive(Debug, Clone, Copy)]
pub struct DelayedConfirmation {
    delay: Duration,
}

impl DelayedConfirmation {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for DelayedConfirmation {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIRMATION_DELAY)
    }
}

#[async_trait]
impl Confirmation for DelayedConfirmation {
    async fn confirm(&self, tx: &Transaction) -> Result<()> {
        tracing::debug!(
            transaction_id = %tx.transaction_id,
            delay_ms = self.delay.as_millis() as u64,
            "awaiting external confirmation"
        );
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
