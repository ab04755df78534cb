pub mod status_writer;
pub mod webhook_reader;
