//! Transport adapters: the HTTP API and the CSV replay format.

pub mod csv;
pub mod http;
