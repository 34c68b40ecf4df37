//! Meshlog Storage Layer
//!
//! This crate implements the on-disk commit log: an append-only, offset-
//! addressed record store split into segments.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── Log ────────────────────────────┐
//! │  ordered segments, rotation, recovery, offset lookup        │
//! │                                                             │
//! │  ┌── Segment (base 0) ──┐   ┌── Segment (base N) ──┐        │
//! │  │ 0.store   0.index    │ … │ N.store   N.index    │ active │
//! │  └──────────────────────┘   └──────────────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! - The **store** file holds record bytes behind 8-byte big-endian length
//!   prefixes, written through a flushed-before-read buffer.
//! - The **index** file maps segment-relative offsets to store positions
//!   through a pre-sized, memory-mapped region of fixed 12-byte entries.
//! - A **segment** pairs one store with one index under a base offset and
//!   translates absolute offsets between the two.
//! - The **log** owns the segments, appends to the last one, rotates when
//!   a cap is hit, and recovers the set from a directory scan on open.
//!
//! Records cross this crate's boundary as `meshlog_proto::log::Record`;
//! their protobuf encoding is the stored byte format.
//!
//! ## Example
//!
//! ```ignore
//! use meshlog_storage::{Config, Log};
//! use meshlog_proto::log::Record;
//!
//! let log = Log::new("./data/log", Config::default())?;
//! let offset = log.append(Record {
//!     value: b"hello".to_vec(),
//!     offset: 0,
//! })?;
//! let record = log.read(offset)?;
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod log;
pub mod segment;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use index::Index;
pub use log::{Log, LogReader};
pub use segment::Segment;
pub use store::Store;
