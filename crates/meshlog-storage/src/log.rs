//! Log - Ordered Segments Under One Directory
//!
//! The log is the public face of the storage layer. It owns an ordered
//! collection of segments, always appending to the last one (the active
//! segment) and rotating to a fresh segment when the active one reaches a
//! configured cap.
//!
//! ## Directory Layout
//!
//! For each segment the directory holds `<base_offset>.store` and
//! `<base_offset>.index`, where `<base_offset>` is the decimal lowest
//! offset the segment covers. Opening a log scans the directory, dedupes
//! the store/index pairs into base offsets, and reopens every segment in
//! ascending order; an empty directory gets one segment at the configured
//! initial offset.
//!
//! ## Locking
//!
//! One reader/writer lock covers the segment list. Appends, truncation,
//! rotation, and lifecycle operations take it exclusively; reads and
//! offset queries share it. Within a segment the store has its own mutex,
//! so concurrent reads of different records proceed in parallel.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use meshlog_proto::log::Record;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::segment::Segment;

/// Append-only commit log over segmented store and index files.
pub struct Log {
    dir: PathBuf,
    config: Config,
    inner: RwLock<Inner>,
}

struct Inner {
    /// Segments ordered by base offset; the last one is active.
    segments: Vec<Segment>,
    closed: bool,
}

impl Log {
    /// Opens the log rooted at `dir`, creating the directory if needed and
    /// recovering any segments already present. Zero caps in `config` are
    /// replaced with the defaults.
    pub fn new(dir: impl AsRef<Path>, mut config: Config) -> Result<Self> {
        if config.max_store_bytes == 0 {
            config.max_store_bytes = 1024;
        }
        if config.max_index_bytes == 0 {
            config.max_index_bytes = 1024;
        }
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let segments = Self::setup(&dir, &config)?;

        Ok(Self {
            dir,
            config,
            inner: RwLock::new(Inner {
                segments,
                closed: false,
            }),
        })
    }

    fn setup(dir: &Path, config: &Config) -> Result<Vec<Segment>> {
        let mut base_offsets = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let name = entry?.file_name();
            let stem = Path::new(&name).file_stem().and_then(|s| s.to_str());
            if let Some(base) = stem.and_then(|s| s.parse::<u64>().ok()) {
                base_offsets.push(base);
            }
        }
        base_offsets.sort_unstable();
        // Each base offset appears once for the store file and once for the
        // index file.
        base_offsets.dedup();

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base in base_offsets {
            segments.push(Segment::new(dir, base, config.clone())?);
        }
        if segments.is_empty() {
            segments.push(Segment::new(dir, config.initial_offset, config.clone())?);
        }
        tracing::debug!(
            dir = %dir.display(),
            segments = segments.len(),
            "log opened"
        );
        Ok(segments)
    }

    /// Appends `record` to the active segment, rotating first if it is
    /// maxed. Returns the offset assigned to the record.
    pub fn append(&self, record: Record) -> Result<u64> {
        let mut inner = self.write_lock();
        if inner.closed {
            return Err(Error::Closed);
        }

        let highest = Self::highest(&inner.segments);
        if inner.segments.last().map_or(true, |s| s.is_maxed()) {
            self.rotate(&mut inner, highest + 1)?;
        }

        // Rotation above guarantees an active segment exists.
        let active = inner
            .segments
            .last_mut()
            .expect("active segment after rotation");
        match active.append(record.clone()) {
            // A full index slipped past the pre-check; rotate and retry so
            // the record is not lost.
            Err(Error::IndexFull) => {
                let highest = Self::highest(&inner.segments);
                self.rotate(&mut inner, highest + 1)?;
                inner
                    .segments
                    .last_mut()
                    .expect("active segment after rotation")
                    .append(record)
            }
            result => result,
        }
    }

    /// Reads the record stored at `offset`.
    pub fn read(&self, offset: u64) -> Result<Record> {
        let inner = self.read_lock();
        if inner.closed {
            return Err(Error::Closed);
        }
        inner
            .segments
            .iter()
            .find(|s| s.base_offset() <= offset && offset < s.next_offset())
            .ok_or(Error::OffsetOutOfRange(offset))?
            .read(offset)
    }

    /// Lowest offset still held by the log.
    pub fn lowest_offset(&self) -> u64 {
        let inner = self.read_lock();
        inner.segments.first().map_or(0, Segment::base_offset)
    }

    /// Highest offset held by the log, or 0 when the log is empty.
    pub fn highest_offset(&self) -> u64 {
        let inner = self.read_lock();
        Self::highest(&inner.segments)
    }

    fn highest(segments: &[Segment]) -> u64 {
        match segments.last().map(Segment::next_offset) {
            None | Some(0) => 0,
            Some(next) => next - 1,
        }
    }

    /// Removes every segment whose records all have offsets at or below
    /// `lowest`. Offsets above `lowest` survive as long as their segment
    /// also holds nothing older.
    pub fn truncate(&self, lowest: u64) -> Result<()> {
        let mut inner = self.write_lock();
        if inner.closed {
            return Err(Error::Closed);
        }
        let mut retained = Vec::with_capacity(inner.segments.len());
        let mut first_err = None;
        for mut segment in inner.segments.drain(..) {
            if segment.next_offset() <= lowest + 1 {
                tracing::debug!(
                    base_offset = segment.base_offset(),
                    "truncating segment"
                );
                if let Err(err) = segment.remove() {
                    // Keep the segment tracked: one of its files may still
                    // exist and a later truncate can retry the removal.
                    retained.push(segment);
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            } else {
                retained.push(segment);
            }
        }
        inner.segments = retained;
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Returns a sequential reader over the raw store bytes of every
    /// segment in offset order: the length-prefixed record format, with no
    /// framing between segments. This is the primitive for whole-log
    /// snapshots, not record-level consumption.
    ///
    /// The reader covers each store's extent as of this call; later
    /// appends are not observed.
    pub fn reader(&self) -> Result<LogReader> {
        let inner = self.read_lock();
        if inner.closed {
            return Err(Error::Closed);
        }
        let mut parts = Vec::with_capacity(inner.segments.len());
        for segment in &inner.segments {
            parts.push(segment.store_snapshot()?);
        }
        Ok(LogReader {
            parts,
            current: 0,
            pos: 0,
        })
    }

    /// Closes every segment. Further appends and reads fail with
    /// `Error::Closed`; closing an already closed log is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.write_lock();
        if inner.closed {
            return Ok(());
        }
        for segment in &mut inner.segments {
            segment.close()?;
        }
        inner.closed = true;
        Ok(())
    }

    /// Closes the log and deletes its directory.
    pub fn remove(&self) -> Result<()> {
        self.close()?;
        std::fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    /// Removes the log from disk and reopens it empty.
    pub fn reset(&self) -> Result<()> {
        self.remove()?;
        let mut inner = self.write_lock();
        std::fs::create_dir_all(&self.dir)?;
        inner.segments = Self::setup(&self.dir, &self.config)?;
        inner.closed = false;
        Ok(())
    }

    fn rotate(&self, inner: &mut Inner, base: u64) -> Result<()> {
        let segment = Segment::new(&self.dir, base, self.config.clone())?;
        tracing::debug!(base_offset = base, "rotated to new segment");
        inner.segments.push(segment);
        Ok(())
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Sequential reader over the concatenated store files of a log, produced
/// by [`Log::reader`].
pub struct LogReader {
    parts: Vec<(File, u64)>,
    current: usize,
    pos: u64,
}

impl io::Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let Some((file, size)) = self.parts.get(self.current) else {
                return Ok(0);
            };
            if self.pos >= *size {
                self.current += 1;
                self.pos = 0;
                continue;
            }
            let want = buf.len().min((*size - self.pos) as usize);
            let n = file.read_at(&mut buf[..want], self.pos)?;
            self.pos += n as u64;
            return Ok(n);
        }
    }
}
