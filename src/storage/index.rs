use crate::error::{Result, StorageError};
use crate::storage::mmap::MmapRegion;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Width of the relative-offset field of an index entry.
pub const OFFSET_WIDTH: u64 = 4;
/// Width of the store-position field of an index entry.
pub const POSITION_WIDTH: u64 = 8;
/// Width of one index entry.
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// An Index maps segment-relative offsets to byte positions in the store.
///
/// Purpose:
/// - O(1) offset lookups: entry N lives at byte `N * 12`
/// - Recover the segment's next offset from its last entry on reopen
///
/// Responsibilities:
/// - Own a `.index` file on disk
/// - Preallocate the file to its maximum size and memory-map all of it
/// - Append entries at the logical end
/// - Report when one more entry would not fit
///
/// NOT responsible for:
/// - Reading store data
/// - Offset assignment
/// - Segment rolling (it only reports `EndOfData`/`is_maxed`)
///
/// ## On-disk format:
/// File name: `<base_offset>.index`
///
/// Each entry is exactly 12 bytes:
/// ```text
/// | relative offset: u32 BE | position: u64 BE |
/// | 4 bytes                 | 8 bytes          |
/// ```
///
/// Entries are dense: entry N always holds relative offset N. While open
/// the file is as large as the configured capacity; only a logical prefix
/// of `size` bytes holds entries. `close()` truncates it back to that prefix.
///
/// ## Ownership:
/// - Index owns the File handle and the mapping exclusively
/// - No internal locking: mutations require `&mut self`
pub struct Index {
    /// Path of the `.index` file.
    path: PathBuf,

    /// File handle, kept open for sync and the final truncate.
    file: File,

    /// Writable mapping over the whole preallocated file.
    mmap: MmapRegion,

    /// Logical size in bytes. Always a multiple of `ENTRY_WIDTH`.
    size: u64,
}

impl Index {
    /// Open or create an index file and map it at full capacity.
    ///
    /// ## Steps:
    /// 1. Open/create the file and note its current length
    /// 2. Extend it to `max_index_bytes` (never shrink existing data)
    /// 3. Map the whole file read/write
    /// 4. Recover the logical size from the dense entry prefix
    ///
    /// A cleanly closed file is exactly its logical size. A file that was
    /// never closed still carries its preallocated tail of zeroes; the scan
    /// stops at the first entry whose relative offset breaks density.
    ///
    /// # Errors
    /// - I/O errors opening, resizing or mapping the file
    pub fn open(path: impl AsRef<Path>, max_index_bytes: u64) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let file_len = file.metadata()?.len();

        // Existing entries are never cut off by a smaller capacity.
        let capacity = max_index_bytes.max(file_len);
        if file_len < capacity {
            file.set_len(capacity)?;
        }

        let mmap = MmapRegion::map_fixed(&file, capacity)?;
        let size = dense_prefix_len(&mmap.as_slice()[..file_len as usize]);

        tracing::debug!(
            path = %path.display(),
            entries = size / ENTRY_WIDTH,
            capacity,
            "index opened"
        );

        Ok(Index {
            path: path.to_path_buf(),
            file,
            mmap,
            size,
        })
    }

    /// Read entry number `entry`.
    ///
    /// # Returns
    /// `(relative_offset, position)`
    ///
    /// # Errors
    /// - `EndOfData` if the index is empty or `entry` is at/beyond the
    ///   logical end
    pub fn read(&self, entry: u32) -> Result<(u32, u64)> {
        if self.size == 0 {
            return Err(StorageError::EndOfData);
        }

        let start = entry as u64 * ENTRY_WIDTH;
        if self.size < start + ENTRY_WIDTH {
            return Err(StorageError::EndOfData);
        }

        Ok(decode_entry(&self.mmap.as_slice()[start as usize..]))
    }

    /// Read the most recent entry.
    ///
    /// # Errors
    /// - `EndOfData` if the index is empty
    pub fn read_last(&self) -> Result<(u32, u64)> {
        if self.size == 0 {
            return Err(StorageError::EndOfData);
        }

        let last = u32::try_from(self.size / ENTRY_WIDTH - 1)
            .map_err(|_| StorageError::EndOfData)?;
        self.read(last)
    }

    /// Append one entry at the logical end.
    ///
    /// The write goes straight into the mapping; it is durable after
    /// `sync()` or `close()`.
    ///
    /// # Errors
    /// - `EndOfData` if the mapped capacity cannot hold one more entry.
    ///   Callers treat this as "segment full".
    pub fn write(&mut self, relative_offset: u32, position: u64) -> Result<()> {
        if self.is_maxed() {
            return Err(StorageError::EndOfData);
        }

        let start = self.size as usize;
        let slot = &mut self.mmap.as_mut_slice()[start..start + ENTRY_WIDTH as usize];
        slot[..OFFSET_WIDTH as usize].copy_from_slice(&relative_offset.to_be_bytes());
        slot[OFFSET_WIDTH as usize..].copy_from_slice(&position.to_be_bytes());

        self.size += ENTRY_WIDTH;

        Ok(())
    }

    /// True iff the mapped capacity cannot fit one more entry.
    pub fn is_maxed(&self) -> bool {
        self.capacity() < self.size + ENTRY_WIDTH
    }

    /// Drop every entry from `entries` onward.
    ///
    /// The dropped bytes are zeroed so a later recovery scan cannot pick
    /// them up again. No-op if the index already holds `entries` or fewer.
    pub fn truncate_entries(&mut self, entries: u64) {
        let new_size = entries * ENTRY_WIDTH;
        if new_size >= self.size {
            return;
        }

        self.mmap.as_mut_slice()[new_size as usize..self.size as usize].fill(0);
        self.size = new_size;
    }

    /// Flush mapped entries to the file.
    pub fn sync(&self) -> Result<()> {
        self.mmap.sync()
    }

    /// Persist and close the index.
    ///
    /// ## Order (mandatory):
    /// 1. msync the mapping (entries reach the file)
    /// 2. munmap (the file may now change length safely)
    /// 3. fsync the file
    /// 4. truncate the preallocated tail down to the logical size
    /// 5. close the file
    pub fn close(self) -> Result<()> {
        let Index {
            path,
            file,
            mmap,
            size,
        } = self;

        mmap.sync()?;
        mmap.unmap();
        file.sync_all()?;
        file.set_len(size)?;
        drop(file);

        tracing::debug!(path = %path.display(), entries = size / ENTRY_WIDTH, "index closed");

        Ok(())
    }

    /// Logical size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of entries written.
    pub fn entries(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }

    /// Mapped capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Path of the `.index` file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn decode_entry(bytes: &[u8]) -> (u32, u64) {
    let relative_offset = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let position = u64::from_be_bytes([
        bytes[4], bytes[5], bytes[6], bytes[7],
        bytes[8], bytes[9], bytes[10], bytes[11],
    ]);
    (relative_offset, position)
}

/// Length in bytes of the longest prefix where entry N holds relative offset N.
///
/// A trailing partial entry is never counted.
fn dense_prefix_len(bytes: &[u8]) -> u64 {
    let width = ENTRY_WIDTH as usize;
    let count = bytes.len() / width;
    if count == 0 {
        return 0;
    }

    // Fast path: a cleanly closed file ends on its last real entry.
    let (last, _) = decode_entry(&bytes[(count - 1) * width..]);
    if last as usize == count - 1 {
        return (count * width) as u64;
    }

    let dense = bytes
        .chunks_exact(width)
        .enumerate()
        .take_while(|(n, entry)| decode_entry(entry).0 as usize == *n)
        .count();

    (dense * width) as u64
}
