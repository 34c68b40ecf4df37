//! Segment - One Store + Index Pair
//!
//! A segment binds a store file and an index file under a shared base
//! offset, which both filenames carry (`<base>.store`, `<base>.index`).
//! It owns the offset arithmetic: absolute offsets map to index entries
//! relative to the base, and index entries map to byte positions in the
//! store. Records are stored in their protobuf wire form.
//!
//! Segments are created and owned by the log, either during recovery of an
//! existing directory or when the active segment maxes out and the log
//! rotates.

use std::path::Path;

use meshlog_proto::log::Record;
use prost::Message;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::Index;
use crate::store::Store;

pub struct Segment {
    store: Store,
    index: Index,
    base_offset: u64,
    next_offset: u64,
    config: Config,
}

impl Segment {
    /// Opens (or creates) the segment for `base_offset` under `dir`. On an
    /// existing segment, the next offset to assign is recovered from the
    /// last index entry.
    pub fn new(dir: &Path, base_offset: u64, config: Config) -> Result<Self> {
        let store = Store::open(dir.join(format!("{base_offset}.store")))?;
        let index = Index::open(
            dir.join(format!("{base_offset}.index")),
            config.max_index_bytes,
        )?;
        let next_offset = match index.read(-1) {
            Some((rel, _)) => base_offset + u64::from(rel) + 1,
            None => base_offset,
        };

        Ok(Self {
            store,
            index,
            base_offset,
            next_offset,
            config,
        })
    }

    /// Appends `record`, assigning it this segment's next offset and
    /// returning that offset. Fails with `Error::IndexFull` when the index
    /// cannot take another entry; the caller rotates and retries.
    pub fn append(&mut self, mut record: Record) -> Result<u64> {
        let cur = self.next_offset;
        record.offset = cur;
        let p = record.encode_to_vec();
        let (_, pos) = self.store.append(&p)?;
        self.index.write((cur - self.base_offset) as u32, pos)?;
        self.next_offset += 1;
        Ok(cur)
    }

    /// Reads the record at absolute offset `offset`.
    pub fn read(&self, offset: u64) -> Result<Record> {
        if offset < self.base_offset {
            return Err(Error::OffsetOutOfRange(offset));
        }
        let (_, pos) = self
            .index
            .read((offset - self.base_offset) as i64)
            .ok_or(Error::OffsetOutOfRange(offset))?;
        let p = self.store.read(pos)?;
        Ok(Record::decode(p.as_slice())?)
    }

    /// True when either file has reached its configured cap or the index
    /// mapping cannot hold another entry.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
            || self.index.is_maxed()
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Offset the next append will be assigned; one past the highest
    /// offset stored here.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub fn store_snapshot(&self) -> Result<(std::fs::File, u64)> {
        self.store.snapshot()
    }

    /// Closes the index (sealing it via truncation) and then the store.
    pub fn close(&mut self) -> Result<()> {
        self.index.close()?;
        self.store.close()?;
        Ok(())
    }

    /// Closes the segment and deletes both files. On failure the segment
    /// value stays usable for a retry, since one of the files may still
    /// exist on disk.
    pub fn remove(&mut self) -> Result<()> {
        self.close()?;
        std::fs::remove_file(self.index.path())?;
        std::fs::remove_file(self.store.path())?;
        Ok(())
    }
}
