//! Application layer containing the ingestion and settlement orchestration.
//!
//! `TransactionRecorder` guarantees one record per transaction id,
//! `SettlementWorkflow` performs the confirmation wait and the conditional
//! PROCESSING -> PROCESSED transition, and `SettlementDispatcher` runs the
//! workflow on background tokio tasks detached from the request that triggered it.

pub mod dispatcher;
pub mod recorder;
pub mod settlement;
