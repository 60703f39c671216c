use crate::error::{Result, StorageError};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Width of the length prefix in front of every store entry.
pub const LEN_WIDTH: u64 = 8;

/// A Store is the append-only data file of a segment.
///
/// Responsibilities:
/// - Own a `.store` file on disk
/// - Append length-prefixed payloads through a buffered writer
/// - Return the byte position where each entry begins
/// - Serve reads by position
///
/// NOT responsible for:
/// - Offset assignment (Segment)
/// - Offset -> position mapping (Index)
/// - Interpreting payload bytes
///
/// ## On-disk format:
/// File name: `<base_offset>.store`
///
/// ```text
/// | length: u64 BE | payload: [u8; length] | length | payload | ...
/// | 8 bytes        | variable              |
/// ```
///
/// Entries are never rewritten. A returned position identifies its entry
/// for the lifetime of the file.
///
/// ## Durability:
/// Appends sit in a `BufWriter` until the next read, `flush()` or `close()`.
/// There is no per-append fsync.
///
/// ## Thread safety:
/// One mutex guards the writer, so appends and reads on the same store are
/// serialized and a reader never observes a partially written entry.
/// The size is mirrored in an atomic so capacity checks never block.
pub struct Store {
    /// Path of the `.store` file, kept for removal and diagnostics.
    path: PathBuf,

    /// Buffered writer over the file handle.
    /// Reads go through `get_ref()` after flushing the buffer.
    writer: Mutex<BufWriter<File>>,

    /// Logical size in bytes, including bytes still sitting in the buffer.
    /// Only updated while the writer lock is held.
    size: AtomicU64,
}

impl Store {
    /// Open or create a store file at the given path.
    ///
    /// Existing contents are kept; new entries are appended after them.
    ///
    /// # Errors
    /// - I/O errors opening, creating or stat-ing the file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;

        let size = file.metadata()?.len();

        Ok(Store {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
            size: AtomicU64::new(size),
        })
    }

    /// Append one payload.
    ///
    /// ## Entry format:
    /// ```text
    /// [length: u64 BE][payload]
    /// ```
    ///
    /// # Returns
    /// `(bytes_written, position)`: `bytes_written` is `8 + payload.len()`,
    /// `position` is where the entry's length prefix begins.
    ///
    /// # Errors
    /// - I/O errors from the buffered writer
    /// - `LockPoisoned`
    pub fn append(&self, payload: &[u8]) -> Result<(u64, u64)> {
        let mut writer = self.lock()?;
        let position = self.size.load(Ordering::Acquire);

        let mut entry = Vec::with_capacity(LEN_WIDTH as usize + payload.len());
        entry.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        entry.extend_from_slice(payload);

        if let Err(e) = writer.write_all(&entry) {
            // Part of the entry may have reached the file or the buffer.
            // Re-derive the size from both so the next position stays accurate;
            // the partial bytes become unreachable space.
            let on_disk = writer.get_ref().metadata()?.len();
            self.size
                .store(on_disk + writer.buffer().len() as u64, Ordering::Release);
            return Err(e.into());
        }

        let written = entry.len() as u64;
        self.size.store(position + written, Ordering::Release);

        Ok((written, position))
    }

    /// Read the payload of the entry starting at `position`.
    ///
    /// Flushes buffered appends first so a read always sees every entry
    /// appended before it in this process.
    ///
    /// # Errors
    /// - `UnexpectedEof` I/O error if `position` is not inside the file, or
    ///   the length prefix there runs past the end of the file
    /// - other I/O errors from flushing or reading
    pub fn read(&self, position: u64) -> Result<Vec<u8>> {
        let mut writer = self.lock()?;
        writer.flush()?;
        let file = writer.get_ref();

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        file.read_exact_at(&mut len_buf, position)?;
        let len = u64::from_be_bytes(len_buf);

        // read_exact_at above proves position + 8 <= size.
        let start = position + LEN_WIDTH;
        let available = self.size.load(Ordering::Acquire).saturating_sub(start);
        if len > available {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "entry at position {} claims {} bytes, only {} remain",
                    position, len, available
                ),
            )
            .into());
        }

        let mut payload = vec![0u8; len as usize];
        file.read_exact_at(&mut payload, start)?;

        Ok(payload)
    }

    /// Raw positional read of file bytes into `buf`.
    ///
    /// Flushes first, then reads at most `buf.len()` bytes at `offset`.
    /// Returns the number of bytes read; 0 means `offset` is at or past EOF.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut writer = self.lock()?;
        writer.flush()?;

        let n = writer.get_ref().read_at(buf, offset)?;
        Ok(n)
    }

    /// Push buffered appends to the OS.
    pub fn flush(&self) -> Result<()> {
        self.lock()?.flush()?;
        Ok(())
    }

    /// Flush buffered appends, fsync, and close the file.
    ///
    /// Consumes the store, so it can only run once.
    pub fn close(self) -> Result<()> {
        let writer = self
            .writer
            .into_inner()
            .map_err(|_| StorageError::LockPoisoned)?;

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        tracing::debug!(
            path = %self.path.display(),
            size = self.size.load(Ordering::Acquire),
            "store closed"
        );

        Ok(())
    }

    /// Current size in bytes, including buffered appends.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Path of the `.store` file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequential reader over the raw store bytes, from position 0.
    pub fn reader(&self) -> StoreReader<'_> {
        StoreReader {
            store: self,
            position: 0,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BufWriter<File>>> {
        self.writer.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

/// `io::Read` adapter over `Store::read_at`.
///
/// Streams the raw file (length prefixes included), e.g. to copy a whole
/// segment elsewhere with `io::copy`.
pub struct StoreReader<'a> {
    store: &'a Store,
    position: u64,
}

impl Read for StoreReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self
            .store
            .read_at(buf, self.position)
            .map_err(|e| match e {
                StorageError::Io(e) => e,
                other => io::Error::new(io::ErrorKind::Other, other),
            })?;
        self.position += n as u64;
        Ok(n)
    }
}
