use crate::domain::transaction::TransactionStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransactionError>;

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("transaction {0} not found")]
    NotFound(String),
    #[error("transaction {0} already exists")]
    DuplicateKey(String),
    #[error("confirmation failed for transaction {transaction_id}: {reason}")]
    ExternalWaitFailure {
        transaction_id: String,
        reason: String,
    },
    #[error("illegal status transition from {from} to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}
