//! Wiring: picks the storage adapter, builds the settlement pipeline and runs
//! either the HTTP service or a CSV replay on top of it.

use crate::application::dispatcher::SettlementDispatcher;
use crate::application::settlement::{SettlementConfig, SettlementWorkflow};
use crate::domain::ports::SharedTransactionStore;
use crate::error::Result;
use crate::infrastructure::confirmation::{DEFAULT_CONFIRMATION_DELAY, DelayedConfirmation};
use crate::infrastructure::in_memory::InMemoryTransactionStore;
use crate::interfaces::csv::status_writer::StatusWriter;
use crate::interfaces::csv::webhook_reader::WebhookReader;
use crate::interfaces::http::{AppState, create_router};
use std::collections::HashSet;
use std::future::Future;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    /// RocksDB directory. `None` keeps everything in memory.
    pub db_path: Option<PathBuf>,
    pub confirmation_delay: Duration,
    pub settlement: SettlementConfig,
    /// How long shutdown waits for in-flight settlements.
    pub shutdown_grace: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            db_path: None,
            confirmation_delay: DEFAULT_CONFIRMATION_DELAY,
            settlement: SettlementConfig::default(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Opens the configured store, falling back to memory when RocksDB support
/// was not compiled in.
pub fn open_store(db_path: Option<&Path>) -> Result<SharedTransactionStore> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = crate::infrastructure::rocksdb::RocksDBStore::open(path)?;
            tracing::info!(path = %path.display(), "using RocksDB storage");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryTransactionStore::new()))
        }
        None => {
            tracing::info!("using in-memory storage");
            Ok(Arc::new(InMemoryTransactionStore::new()))
        }
    }
}

pub fn build_dispatcher(
    store: SharedTransactionStore,
    config: &ServiceConfig,
) -> SettlementDispatcher {
    let confirmation = Arc::new(DelayedConfirmation::new(config.confirmation_delay));
    SettlementDispatcher::new(SettlementWorkflow::new(
        store,
        confirmation,
        config.settlement,
    ))
}

/// Serves the HTTP API until `shutdown` resolves, then drains settlements.
pub async fn serve<F>(config: ServiceConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = open_store(config.db_path.as_deref())?;
    let dispatcher = build_dispatcher(store.clone(), &config);
    let router = create_router(AppState::new(store, dispatcher.clone()));

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        confirmation_delay_ms = config.confirmation_delay.as_millis() as u64,
        "transaction service listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!(
        in_flight = dispatcher.in_flight(),
        "shutting down, draining settlements"
    );
    let remaining = dispatcher.drain(config.shutdown_grace).await;
    if remaining > 0 {
        tracing::warn!(remaining, "settlements abandoned at shutdown, records stay PROCESSING");
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub submitted: usize,
    pub rejected: usize,
}

/// Pushes every webhook row of `input` through settlement, waits for all of
/// them, and reports the resulting status of each submitted id to `output`.
///
/// Rows that fail to parse or validate are reported on stderr and skipped.
pub async fn replay<R: Read, W: Write>(
    input: R,
    output: W,
    store: SharedTransactionStore,
    config: &ServiceConfig,
) -> Result<ReplaySummary> {
    let dispatcher = build_dispatcher(store.clone(), config);
    let mut summary = ReplaySummary::default();
    let mut seen = HashSet::new();
    let mut order = Vec::new();

    for row in WebhookReader::new(input).webhooks() {
        match row {
            Ok(webhook) => {
                if seen.insert(webhook.transaction_id.clone()) {
                    order.push(webhook.transaction_id.clone());
                }
                dispatcher.dispatch(webhook);
                summary.submitted += 1;
            }
            Err(e) => {
                eprintln!("Error reading webhook: {}", e);
                summary.rejected += 1;
            }
        }
    }

    dispatcher.drain(Duration::MAX).await;

    let mut transactions = Vec::with_capacity(order.len());
    for transaction_id in &order {
        if let Some(tx) = store.find(transaction_id).await? {
            transactions.push(tx);
        }
    }
    StatusWriter::new(output).write_transactions(&transactions)?;

    tracing::info!(
        submitted = summary.submitted,
        rejected = summary.rejected,
        "replay finished"
    );
    Ok(summary)
}
