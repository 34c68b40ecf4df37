//! Log Configuration
//!
//! Controls how large a segment may grow and where an empty log starts:
//!
//! - **max_store_bytes**: cap on a segment's store file (default: 1024)
//! - **max_index_bytes**: cap on a segment's index file; this is also the
//!   size the index file is pre-allocated and memory-mapped at
//!   (default: 1024)
//! - **initial_offset**: base offset of the first segment created in an
//!   empty directory (default: 0)
//!
//! A zero value for either cap means "use the default"; `Log::new` fills
//! the defaults in before any segment is opened.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum store file size in bytes before the segment is maxed.
    #[serde(default = "default_max_store_bytes")]
    pub max_store_bytes: u64,

    /// Maximum index file size in bytes; also the mmap pre-allocation size.
    #[serde(default = "default_max_index_bytes")]
    pub max_index_bytes: u64,

    /// Base offset of the first segment in an empty log.
    #[serde(default)]
    pub initial_offset: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_store_bytes: default_max_store_bytes(),
            max_index_bytes: default_max_index_bytes(),
            initial_offset: 0,
        }
    }
}

fn default_max_store_bytes() -> u64 {
    1024
}

fn default_max_index_bytes() -> u64 {
    1024
}
