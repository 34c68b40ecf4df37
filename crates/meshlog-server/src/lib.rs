//! Meshlog gRPC Server
//!
//! Exposes a commit log over the `Log` gRPC service:
//! - `Produce` / `ProduceStream`: append records
//! - `Consume`: read one record by offset
//! - `ConsumeStream`: follow the log from an offset onward

pub mod service;

pub use service::{CommitLog, LogService};
