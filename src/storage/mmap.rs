use crate::error::Result;
use memmap2::{MmapMut, MmapOptions};
use std::fs::File;
use std::io;

/// A writable, fixed-capacity memory-mapped region of a file.
///
/// # Purpose
/// Backs the `.index` file: the whole preallocated file is mapped once at
/// open and entries are written straight into memory. Nothing here grows
/// or shrinks the mapping; the owner sizes the file before mapping it and
/// truncates it only after the region is gone.
///
/// # Durability
/// Writes land in the shared page cache immediately but are only guaranteed
/// on disk after `sync()`. Dropping the region unmaps it without syncing.
///
/// # Ownership & Lifetime Rules
/// - The region is OWNED by the Index (never handed out)
/// - The file must not be truncated while the region exists
/// - `unmap()` (or drop) MUST happen before the file is truncated
///
/// # Thread Safety
/// Mutation requires `&mut self`; the Index provides no locking of its own.
#[derive(Debug)]
pub struct MmapRegion {
    /// The underlying shared, writable mapping.
    mmap: MmapMut,
}

impl MmapRegion {
    /// Map the first `len` bytes of `file` read/write.
    ///
    /// The file must already be at least `len` bytes long.
    ///
    /// # Errors
    /// - `len` is zero (cannot mmap an empty region)
    /// - the file is shorter than `len`
    /// - OS mmap call fails (permissions, limits, etc.)
    pub fn map_fixed(file: &File, len: u64) -> Result<Self> {
        if len == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "cannot mmap empty region").into());
        }

        let file_len = file.metadata()?.len();
        if file_len < len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("file is {} bytes, cannot map {} bytes", file_len, len),
            )
            .into());
        }

        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "mapping exceeds address space"))?;

        // SAFETY: the mapping is shared and writable. It stays sound as long
        // as the file is not truncated below `len` while mapped; the Index
        // only truncates after `unmap()`, and segment files are owned by a
        // single Segment within this process.
        let mmap = unsafe { MmapOptions::new().len(len).map_mut(file)? };

        Ok(MmapRegion { mmap })
    }

    /// Read-only view of the whole mapped region.
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    /// Writable view of the whole mapped region.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Length of the mapped region in bytes.
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Always false for a successfully mapped region.
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Synchronously flush dirty pages to the file (msync MS_SYNC).
    pub fn sync(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// Release the mapping (munmap).
    pub fn unmap(self) {
        drop(self.mmap);
    }
}
