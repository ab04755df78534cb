//! Adapters for the domain ports: transaction storage and the confirmation step.

pub mod confirmation;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
