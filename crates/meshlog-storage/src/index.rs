//! Index File - Offset to Store Position Mapping
//!
//! The index is the lookup half of a segment: a memory-mapped file of
//! fixed-width entries translating a record's offset (relative to the
//! segment's base) into the byte position of its entry in the store file.
//!
//! ## File Format
//!
//! ```text
//! [Entry 0][Entry 1]...[Entry N-1]
//!
//! Entry (12 bytes):
//! ┌─────────────────────┬─────────────────────┐
//! │ Relative offset     │ Store position      │
//! │ (4 bytes, BE u32)   │ (8 bytes, BE u64)   │
//! └─────────────────────┴─────────────────────┘
//! ```
//!
//! ## Sizing Lifecycle
//!
//! The file is grown to `max_index_bytes` as soon as it is opened and the
//! whole region is mapped read-write-shared, because remapping on every
//! append would be expensive. The logical `size` field tracks the used
//! prefix. Closing syncs the mapping and the file, then truncates the file
//! back to `size`; that truncation is what marks the index as cleanly
//! closed, since the next open derives its starting `size` from the file
//! length. A process that dies without closing leaves the file at its
//! pre-allocated length with a zeroed tail, which a later open would
//! misread; the `Drop` impl shrinks the file on a clean drop to narrow
//! that window to real crashes.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::{Error, Result};

/// Width in bytes of the relative-offset column.
const OFFSET_WIDTH: u64 = 4;
/// Width in bytes of the store-position column.
const POSITION_WIDTH: u64 = 8;
/// Width in bytes of one index entry.
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// Memory-mapped, append-only index over a segment's store file.
pub struct Index {
    path: PathBuf,
    /// File handle and mapping, dropped (unmapped and closed) by `close`.
    state: Option<State>,
    /// Length in bytes of the used prefix of the mapping.
    size: u64,
}

struct State {
    file: File,
    mmap: MmapMut,
}

impl Index {
    /// Opens (creating if necessary) the index file at `path`, growing it
    /// to `max_index_bytes` and mapping the full region. The on-disk length
    /// before the grow seeds `size`: a cleanly closed index was truncated
    /// to exactly its used prefix.
    pub fn open(path: impl AsRef<Path>, max_index_bytes: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        file.set_len(max_index_bytes)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            path,
            state: Some(State { file, mmap }),
            size,
        })
    }

    /// Appends one (relative offset, store position) entry. Returns
    /// `Error::IndexFull` when the mapping cannot hold another entry.
    pub fn write(&mut self, off: u32, pos: u64) -> Result<()> {
        let size = self.size;
        let state = self.state.as_mut().ok_or(Error::Closed)?;
        if (state.mmap.len() as u64) < size + ENTRY_WIDTH {
            return Err(Error::IndexFull);
        }
        let at = size as usize;
        state.mmap[at..at + OFFSET_WIDTH as usize].copy_from_slice(&off.to_be_bytes());
        state.mmap[at + OFFSET_WIDTH as usize..at + ENTRY_WIDTH as usize]
            .copy_from_slice(&pos.to_be_bytes());
        self.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Reads entry `n`; `-1` addresses the last entry. Returns `None` when
    /// the index is empty, closed, or `n` lies past the used prefix.
    pub fn read(&self, n: i64) -> Option<(u32, u64)> {
        let state = self.state.as_ref()?;
        if self.size == 0 {
            return None;
        }
        let n = if n == -1 {
            (self.size / ENTRY_WIDTH) - 1
        } else {
            n as u64
        };
        let at = n * ENTRY_WIDTH;
        // The second bound matters when a file outlives a shrunk cap: the
        // recorded size may then exceed the mapped region.
        if self.size < at + ENTRY_WIDTH || (state.mmap.len() as u64) < at + ENTRY_WIDTH {
            return None;
        }

        let at = at as usize;
        let off = u32::from_be_bytes([
            state.mmap[at],
            state.mmap[at + 1],
            state.mmap[at + 2],
            state.mmap[at + 3],
        ]);
        let pos = u64::from_be_bytes([
            state.mmap[at + 4],
            state.mmap[at + 5],
            state.mmap[at + 6],
            state.mmap[at + 7],
            state.mmap[at + 8],
            state.mmap[at + 9],
            state.mmap[at + 10],
            state.mmap[at + 11],
        ]);
        Some((off, pos))
    }

    /// True when the mapping cannot hold another entry (a closed index
    /// cannot hold any).
    pub fn is_maxed(&self) -> bool {
        self.state
            .as_ref()
            .map_or(true, |s| (s.mmap.len() as u64) < self.size + ENTRY_WIDTH)
    }

    /// Length in bytes of the used prefix.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Syncs the mapping and the file, truncates the file back to the used
    /// prefix so the next open recovers `size` from the file length, then
    /// unmaps and closes. Idempotent; later writes fail with
    /// `Error::Closed`.
    pub fn close(&mut self) -> Result<()> {
        let Some(state) = self.state.as_ref() else {
            return Ok(());
        };
        state.mmap.flush()?;
        state.file.sync_all()?;
        state.file.set_len(self.size)?;
        // Only discard the handles once every step succeeded, so a failed
        // close leaves the index open and the call retryable.
        self.state = None;
        Ok(())
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        // Best effort: an index dropped without close() must not leave the
        // pre-allocated length behind, or the next open would misread the
        // zeroed tail as entries.
        if let Some(state) = self.state.take() {
            let _ = state.mmap.flush();
            let _ = state.file.set_len(self.size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_INDEX_BYTES: u64 = 1024;

    #[test]
    fn test_read_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open(dir.path().join("empty.index"), MAX_INDEX_BYTES).unwrap();

        assert_eq!(index.read(-1), None);
        assert_eq!(index.read(0), None);
    }

    #[test]
    fn test_write_read_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::open(dir.path().join("rw.index"), MAX_INDEX_BYTES).unwrap();

        let entries = [(0u32, 0u64), (1, 10), (2, 29)];
        for (off, pos) in entries {
            index.write(off, pos).unwrap();
        }

        for (i, (off, pos)) in entries.into_iter().enumerate() {
            assert_eq!(index.read(i as i64), Some((off, pos)));
        }
        assert_eq!(index.read(-1), Some((2, 29)));
        assert_eq!(index.read(3), None);
    }

    #[test]
    fn test_write_past_capacity_is_full() {
        let dir = tempfile::tempdir().unwrap();
        let mut index =
            Index::open(dir.path().join("full.index"), ENTRY_WIDTH * 2).unwrap();

        index.write(0, 0).unwrap();
        index.write(1, 19).unwrap();
        assert!(index.is_maxed());
        assert!(matches!(index.write(2, 38), Err(Error::IndexFull)));
        // The failed write must not grow the used prefix.
        assert_eq!(index.size(), ENTRY_WIDTH * 2);
    }

    #[test]
    fn test_file_presized_while_open_truncated_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sizing.index");

        let mut index = Index::open(&path, MAX_INDEX_BYTES).unwrap();
        index.write(0, 0).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), MAX_INDEX_BYTES);

        index.close().unwrap();
        drop(index);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), ENTRY_WIDTH);
    }

    #[test]
    fn test_reopen_recovers_size_and_last_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.index");

        let mut index = Index::open(&path, MAX_INDEX_BYTES).unwrap();
        index.write(0, 0).unwrap();
        index.write(1, 10).unwrap();
        index.close().unwrap();
        drop(index);

        let index = Index::open(&path, MAX_INDEX_BYTES).unwrap();
        assert_eq!(index.size(), ENTRY_WIDTH * 2);
        assert_eq!(index.read(-1), Some((1, 10)));
        assert_eq!(index.read(0), Some((0, 0)));
    }

    #[test]
    fn test_operations_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::open(dir.path().join("closed.index"), MAX_INDEX_BYTES).unwrap();
        index.write(0, 0).unwrap();

        index.close().unwrap();
        // Closing again is a no-op.
        index.close().unwrap();

        assert!(matches!(index.write(1, 19), Err(Error::Closed)));
        assert_eq!(index.read(-1), None);
        assert!(index.is_maxed());
        // The recorded size survives the close.
        assert_eq!(index.size(), ENTRY_WIDTH);
    }

    #[test]
    fn test_drop_without_close_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drop.index");

        let mut index = Index::open(&path, MAX_INDEX_BYTES).unwrap();
        index.write(0, 0).unwrap();
        drop(index);

        assert_eq!(std::fs::metadata(&path).unwrap().len(), ENTRY_WIDTH);
    }
}
