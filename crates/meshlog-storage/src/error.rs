//! Storage Error Types
//!
//! This module defines all error types that can occur in log operations.
//!
//! ## Error Categories
//!
//! ### Read Errors
//! - `OffsetOutOfRange`: the requested offset is below the lowest retained
//!   offset or past the log tail. Streaming consumers treat this as
//!   retryable; everything else treats it as not-found.
//!
//! ### Write Errors
//! - `IndexFull`: the active segment's index cannot hold another entry.
//!   This is the internal rotation signal; `Log::append` handles it and it
//!   never reaches callers.
//!
//! ### I/O and Data Errors
//! - `Io`: disk, mmap, or sync failure, propagated verbatim
//! - `Codec`: a stored record failed to decode
//!
//! ### Lifecycle Errors
//! - `Closed`: a mutating operation was attempted on a closed log
//!
//! ## Usage
//!
//! All storage operations return `Result<T>` which is aliased to
//! `Result<T, Error>`. This allows clean error propagation with `?`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("offset out of range: {0}")]
    OffsetOutOfRange(u64),

    #[error("segment index is full")]
    IndexFull,

    #[error("record decode error: {0}")]
    Codec(#[from] prost::DecodeError),

    #[error("log is closed")]
    Closed,
}
