use crate::error::{Result, TransactionError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A strictly positive transaction amount.
///
/// Construction (and deserialization, via `try_from`) rejects zero and negative
/// values, so a recorded transaction can never carry a non-positive amount.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(TransactionError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = TransactionError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Lifecycle state of a recorded transaction.
///
/// `Processing -> Processed` is the only legal transition; `Processed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Processing,
    Processed,
}

impl TransactionStatus {
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Processing, TransactionStatus::Processed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == TransactionStatus::Processed
    }

    /// Fails with `InvalidTransition` unless `from -> to` is a legal step.
    pub fn ensure_transition(from: TransactionStatus, to: TransactionStatus) -> Result<()> {
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(TransactionError::InvalidTransition { from, to })
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Processing => f.write_str("PROCESSING"),
            TransactionStatus::Processed => f.write_str("PROCESSED"),
        }
    }
}

/// Inbound notification announcing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionWebhook {
    pub transaction_id: String,
    pub source_account: String,
    pub destination_account: String,
    pub amount: Amount,
    pub currency: String,
}

impl TransactionWebhook {
    /// Rejects blank identifiers. The amount is already guaranteed positive by `Amount`.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("transaction_id", &self.transaction_id),
            ("source_account", &self.source_account),
            ("destination_account", &self.destination_account),
            ("currency", &self.currency),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(TransactionError::ValidationError(format!(
                    "{name} must not be empty"
                )));
            }
        }
        Ok(())
    }
}

/// The persisted record of a transaction and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub source_account: String,
    pub destination_account: String,
    pub amount: Amount,
    pub currency: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Builds the initial `PROCESSING` record for a first-seen webhook.
    pub fn from_webhook(webhook: TransactionWebhook, created_at: DateTime<Utc>) -> Self {
        Self {
            transaction_id: webhook.transaction_id,
            source_account: webhook.source_account,
            destination_account: webhook.destination_account,
            amount: webhook.amount,
            currency: webhook.currency,
            status: TransactionStatus::Processing,
            created_at,
            processed_at: None,
        }
    }

    /// Moves the record to `next`, stamping `processed_at` on entry to `PROCESSED`.
    ///
    /// Stores call this only after their own compare step succeeded; the
    /// legality check here keeps the status monotonic regardless of caller.
    pub fn apply_transition(&mut self, next: TransactionStatus, at: DateTime<Utc>) -> Result<()> {
        TransactionStatus::ensure_transition(self.status, next)?;
        self.status = next;
        if next == TransactionStatus::Processed {
            // processed_at never precedes created_at, even if the clock stepped back
            self.processed_at = Some(at.max(self.created_at));
        }
        Ok(())
    }
}
