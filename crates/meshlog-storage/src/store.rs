//! Store File - Append-Only Record Bytes
//!
//! The store is the byte half of a segment: an append-only file holding
//! every record's encoded bytes behind a length prefix. The index half
//! (`index.rs`) maps offsets to byte positions in this file.
//!
//! ## File Format
//!
//! ```text
//! [Entry 1][Entry 2]...[Entry N]
//!
//! Entry:
//! ┌──────────────────┬─────────────────┐
//! │ Length (8 bytes, │ Record bytes    │
//! │ big-endian u64)  │ (length bytes)  │
//! └──────────────────┴─────────────────┘
//! ```
//!
//! There is no header, footer, or checksum; the format is wire-observable
//! and shared with the whole-log reader, so it must not change.
//!
//! ## Buffering
//!
//! Appends go through a userspace write buffer to batch small records into
//! fewer syscalls. Reads are positional and must observe prior appends, so
//! every read flushes the buffer first. A single mutex serializes all
//! operations.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// Width of the big-endian length prefix written before every entry.
pub const LEN_WIDTH: u64 = 8;

/// Append-only, length-prefixed byte file with buffered writes and
/// positional reads.
pub struct Store {
    path: PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    /// Open file handles, dropped (and thereby closed) by `close`.
    handles: Option<Handles>,
    /// Total file size in bytes, length prefixes included.
    size: u64,
}

struct Handles {
    /// Handle used for positional reads.
    file: File,
    /// Buffered writer over a second handle to the same file, opened in
    /// append mode so writes always land at the end.
    buf: BufWriter<File>,
}

impl Store {
    /// Opens (creating if necessary) the store file at `path`. An existing
    /// file is appended to; its current length seeds `size`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        let writer = file.try_clone()?;

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                handles: Some(Handles {
                    file,
                    buf: BufWriter::new(writer),
                }),
                size,
            }),
        })
    }

    /// Appends `p` behind its length prefix. Returns the number of bytes
    /// written (prefix included) and the byte position the entry starts at.
    pub fn append(&self, p: &[u8]) -> Result<(u64, u64)> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let handles = inner.handles.as_mut().ok_or(Error::Closed)?;
        let pos = inner.size;
        handles.buf.write_all(&(p.len() as u64).to_be_bytes())?;
        handles.buf.write_all(p)?;
        let n = LEN_WIDTH + p.len() as u64;
        inner.size += n;
        Ok((n, pos))
    }

    /// Reads the entry starting at byte position `pos`, flushing buffered
    /// appends first so they are visible.
    pub fn read(&self, pos: u64) -> Result<Vec<u8>> {
        let mut guard = self.lock();
        let handles = guard.handles.as_mut().ok_or(Error::Closed)?;
        handles.buf.flush()?;
        let mut len = [0u8; LEN_WIDTH as usize];
        handles.file.read_exact_at(&mut len, pos)?;
        let mut p = vec![0u8; u64::from_be_bytes(len) as usize];
        handles.file.read_exact_at(&mut p, pos + LEN_WIDTH)?;
        Ok(p)
    }

    /// Fills `buf` exactly from absolute byte offset `off`, flushing
    /// buffered appends first. Returns the number of bytes read.
    pub fn read_at(&self, buf: &mut [u8], off: u64) -> Result<usize> {
        let mut guard = self.lock();
        let handles = guard.handles.as_mut().ok_or(Error::Closed)?;
        handles.buf.flush()?;
        handles.file.read_exact_at(buf, off)?;
        Ok(buf.len())
    }

    /// Flushes the write buffer and returns a cloned read handle together
    /// with the size it covers. Used by the whole-log byte reader so it can
    /// stream the file without holding the store lock.
    pub fn snapshot(&self) -> Result<(File, u64)> {
        let mut guard = self.lock();
        let size = guard.size;
        let handles = guard.handles.as_mut().ok_or(Error::Closed)?;
        handles.buf.flush()?;
        Ok((handles.file.try_clone()?, size))
    }

    /// Current file size in bytes, buffered appends included.
    pub fn size(&self) -> u64 {
        self.lock().size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes buffered appends, syncs, and closes the file. Idempotent;
    /// later operations fail with `Error::Closed`.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.lock();
        let Some(handles) = guard.handles.as_mut() else {
            return Ok(());
        };
        handles.buf.flush()?;
        handles.file.sync_all()?;
        // Only drop the handles once the flush landed, so a failed close
        // leaves the store open and the call retryable.
        guard.handles = None;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WRITE: &[u8] = b"hello world";

    fn entry_width() -> u64 {
        LEN_WIDTH + WRITE.len() as u64
    }

    #[test]
    fn test_append_returns_widths_and_positions() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("append.store")).unwrap();

        for i in 1..4u64 {
            let (n, pos) = store.append(WRITE).unwrap();
            assert_eq!(pos + n, entry_width() * i);
        }
        assert_eq!(store.size(), entry_width() * 3);
    }

    #[test]
    fn test_read_observes_buffered_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("read.store")).unwrap();

        for _ in 0..3 {
            store.append(WRITE).unwrap();
        }

        let mut pos = 0;
        for _ in 0..3 {
            assert_eq!(store.read(pos).unwrap(), WRITE);
            pos += entry_width();
        }
    }

    #[test]
    fn test_read_at_prefix_then_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("read_at.store")).unwrap();

        for _ in 0..3 {
            store.append(WRITE).unwrap();
        }

        let mut off = 0;
        for _ in 0..3 {
            let mut prefix = [0u8; LEN_WIDTH as usize];
            let n = store.read_at(&mut prefix, off).unwrap();
            assert_eq!(n, LEN_WIDTH as usize);
            off += n as u64;

            let len = u64::from_be_bytes(prefix);
            assert_eq!(len, WRITE.len() as u64);

            let mut payload = vec![0u8; len as usize];
            let n = store.read_at(&mut payload, off).unwrap();
            assert_eq!(payload, WRITE);
            off += n as u64;
        }
    }

    #[test]
    fn test_reopen_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.store");

        let store = Store::open(&path).unwrap();
        for _ in 0..3 {
            store.append(WRITE).unwrap();
        }
        store.close().unwrap();
        drop(store);

        let store = Store::open(&path).unwrap();
        assert_eq!(store.size(), entry_width() * 3);
        let mut pos = 0;
        for _ in 0..3 {
            assert_eq!(store.read(pos).unwrap(), WRITE);
            pos += entry_width();
        }
    }

    #[test]
    fn test_close_flushes_buffered_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("close.store");

        let store = Store::open(&path).unwrap();
        store.append(WRITE).unwrap();

        // The append is still sitting in the write buffer.
        let before = std::fs::metadata(&path).unwrap().len();
        store.close().unwrap();
        let after = std::fs::metadata(&path).unwrap().len();

        assert!(after > before);
        assert_eq!(after, entry_width());
    }

    #[test]
    fn test_operations_after_close_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("closed.store")).unwrap();
        store.append(WRITE).unwrap();

        store.close().unwrap();
        // Closing again is a no-op.
        store.close().unwrap();

        assert!(matches!(store.append(WRITE), Err(Error::Closed)));
        assert!(matches!(store.read(0), Err(Error::Closed)));
        let mut buf = [0u8; 1];
        assert!(matches!(store.read_at(&mut buf, 0), Err(Error::Closed)));
        assert!(matches!(store.snapshot(), Err(Error::Closed)));
        // The recorded size survives the close.
        assert_eq!(store.size(), entry_width());
    }

    #[test]
    fn test_read_past_end_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("past_end.store")).unwrap();
        store.append(WRITE).unwrap();

        assert!(store.read(entry_width()).is_err());
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("empty.store")).unwrap();

        let (n, pos) = store.append(b"").unwrap();
        assert_eq!(n, LEN_WIDTH);
        assert_eq!(pos, 0);
        assert_eq!(store.read(0).unwrap(), Vec::<u8>::new());
    }
}
