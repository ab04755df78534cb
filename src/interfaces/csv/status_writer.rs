use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct StatusRow<'a> {
    transaction_id: &'a str,
    status: TransactionStatus,
    processed_at: Option<DateTime<Utc>>,
}

/// Writes `transaction_id,status,processed_at` rows to any `Write` sink.
pub struct StatusWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> StatusWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_transactions<'a, I>(&mut self, transactions: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        for tx in transactions {
            self.writer.serialize(StatusRow {
                transaction_id: &tx.transaction_id,
                status: tx.status,
                processed_at: tx.processed_at,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
