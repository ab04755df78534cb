use crate::domain::ports::{StatusUpdate, TransactionStore};
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::error::{Result, TransactionError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing transaction records.
pub const CF_TRANSACTIONS: &str = "transactions";

/// A persistent store implementation using RocksDB.
///
/// Records are keyed by the UTF-8 bytes of `transaction_id` and stored as JSON.
/// RocksDB has no native compare-and-set, so `insert` and `update_status` run
/// their read-check-write under `write_lock`. RocksDB's own LOCK file keeps any
/// other process from opening the same path, which makes the lock sufficient.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>` and lock).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the "transactions" column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_transactions = ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_transactions])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn read(&self, transaction_id: &str) -> Result<Option<Transaction>> {
        let cf = self.db.cf_handle(CF_TRANSACTIONS).ok_or_else(|| {
            TransactionError::Storage("Transactions column family not found".to_string())
        })?;

        match self.db.get_cf(&cf, transaction_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, tx: &Transaction) -> Result<()> {
        let cf = self.db.cf_handle(CF_TRANSACTIONS).ok_or_else(|| {
            TransactionError::Storage("Transactions column family not found".to_string())
        })?;

        let value = serde_json::to_vec(tx)?;
        self.db.put_cf(&cf, tx.transaction_id.as_bytes(), value)?;
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn find(&self, transaction_id: &str) -> Result<Option<Transaction>> {
        self.read(transaction_id)
    }

    async fn insert(&self, tx: Transaction) -> Result<Transaction> {
        let _guard = self.write_lock.lock().await;

        let cf = self.db.cf_handle(CF_TRANSACTIONS).ok_or_else(|| {
            TransactionError::Storage("Transactions column family not found".to_string())
        })?;
        // Existence check only, without deserializing the stored value
        if self
            .db
            .get_pinned_cf(&cf, tx.transaction_id.as_bytes())?
            .is_some()
        {
            return Err(TransactionError::DuplicateKey(tx.transaction_id));
        }

        self.write(&tx)?;
        Ok(tx)
    }

    async fn update_status(
        &self,
        transaction_id: &str,
        expected: TransactionStatus,
        new: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusUpdate> {
        TransactionStatus::ensure_transition(expected, new)?;

        let _guard = self.write_lock.lock().await;

        let Some(mut tx) = self.read(transaction_id)? else {
            return Ok(StatusUpdate::NotApplied { current: None });
        };
        if tx.status != expected {
            return Ok(StatusUpdate::NotApplied {
                current: Some(tx.status),
            });
        }

        tx.apply_transition(new, at)?;
        self.write(&tx)?;
        Ok(StatusUpdate::Applied(tx))
    }
}
