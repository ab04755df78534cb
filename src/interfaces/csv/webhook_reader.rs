use crate::domain::transaction::{Amount, TransactionWebhook};
use crate::error::{Result, TransactionError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

// The csv deserializer infers numeric fields as f64, so the amount is taken as
// text and parsed exactly.
#[derive(Debug, Deserialize)]
struct WebhookRow {
    transaction_id: String,
    source_account: String,
    destination_account: String,
    amount: String,
    currency: String,
}

impl TryFrom<WebhookRow> for TransactionWebhook {
    type Error = TransactionError;

    fn try_from(row: WebhookRow) -> Result<Self> {
        let amount = Decimal::from_str_exact(&row.amount).map_err(|e| {
            TransactionError::ValidationError(format!("Invalid amount '{}': {e}", row.amount))
        })?;
        Ok(Self {
            transaction_id: row.transaction_id,
            source_account: row.source_account,
            destination_account: row.destination_account,
            amount: Amount::new(amount)?,
            currency: row.currency,
        })
    }
}

/// Reads webhook payloads from a CSV source.
///
/// Expects the header `transaction_id,source_account,destination_account,amount,currency`.
/// Whitespace is trimmed, and every row goes through `TransactionWebhook::validate`,
/// so blank identifiers surface as errors rather than records.
pub struct WebhookReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> WebhookReader<R> {
    /// Creates a new `WebhookReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and validates webhooks.
    pub fn webhooks(self) -> impl Iterator<Item = Result<TransactionWebhook>> {
        self.reader.into_deserialize().map(|result| {
            let row: WebhookRow = result.map_err(TransactionError::from)?;
            let webhook = TransactionWebhook::try_from(row)?;
            webhook.validate()?;
            Ok(webhook)
        })
    }
}
