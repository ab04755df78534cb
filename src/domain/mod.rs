pub mod ports;
pub mod transaction;
