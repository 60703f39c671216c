use crate::config::Config;
use crate::error::{Result, StorageError};
use crate::record::Record;
use crate::storage::index::Index;
use crate::storage::store::{Store, StoreReader, LEN_WIDTH};
use std::fs;
use std::path::{Path, PathBuf};

/// File extension of a segment's data file.
pub const STORE_EXTENSION: &str = "store";
/// File extension of a segment's index file.
pub const INDEX_EXTENSION: &str = "index";

/// A Segment is one bounded, offset-addressed piece of the log.
///
/// Responsibilities:
/// - Own one Store and one Index sharing a base offset
/// - Assign contiguous global offsets to appended records
/// - Translate global offsets to index entries on read
/// - Report when it is full so the caller can roll over
///
/// NOT responsible for:
/// - Creating the next segment (caller opens one at `next_offset()`)
/// - Retention (caller decides when to `remove()`)
/// - Locking: `append` takes `&mut self`, so one writer per segment is
///   enforced by the borrow checker. Share across threads behind a lock.
///
/// ## Files:
/// ```text
/// <dir>/<base_offset>.store   length-prefixed encoded records
/// <dir>/<base_offset>.index   12-byte entries: relative offset -> store position
/// ```
///
/// ## Offsets:
/// - `base_offset`: first global offset this segment may hold
/// - `next_offset`: offset the next append will get
/// - relative offset of a record = global offset - base_offset
/// - Invariant: `next_offset - base_offset == index.entries()`
///
/// ## Lifecycle:
/// Open -> Closed (`close()`, reopenable) or Removed (`remove()`, terminal).
/// Both consume the segment.
pub struct Segment {
    /// Append-only record data.
    store: Store,

    /// Relative offset -> store position.
    index: Index,

    /// Global offset of the first record in this segment.
    /// Encoded in both file names and never changes.
    base_offset: u64,

    /// Global offset the next appended record will receive.
    next_offset: u64,

    /// Size limits this segment was opened with.
    config: Config,
}

impl Segment {
    /// Open or create the segment starting at `base_offset` inside `dir`.
    ///
    /// For a new segment, `next_offset` starts at `base_offset`. For an
    /// existing one it is recovered from the last index entry:
    /// `base_offset + last_relative + 1`.
    ///
    /// Before recovering, index entries that point past the end of the store
    /// are dropped. That happens when the mapped index reached disk but the
    /// buffered store bytes did not.
    ///
    /// # Arguments
    /// - `dir`: Directory holding the segment files (must exist)
    /// - `base_offset`: Global offset of the first record in this segment
    /// - `config`: Size limits; validated before any file is touched
    ///
    /// # Errors
    /// - `InvalidConfig` if the limits are unusable
    /// - `Decode` if the recovered next offset does not fit in u64
    /// - I/O errors opening, creating or mapping either file
    pub fn open(dir: impl AsRef<Path>, base_offset: u64, config: Config) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref();

        let store = Store::open(segment_path(dir, base_offset, STORE_EXTENSION))?;
        let mut index = Index::open(
            segment_path(dir, base_offset, INDEX_EXTENSION),
            config.segment.max_index_bytes,
        )?;

        trim_unreachable_entries(&store, &mut index)?;

        let next_offset = match index.read_last() {
            Ok((relative, _)) => base_offset
                .checked_add(relative as u64 + 1)
                .ok_or_else(|| {
                    StorageError::Decode(format!(
                        "index entry {} overflows u64 offsets from base {}",
                        relative, base_offset
                    ))
                })?,
            Err(StorageError::EndOfData) => base_offset,
            Err(e) => return Err(e),
        };

        tracing::debug!(
            dir = %dir.display(),
            base_offset,
            next_offset,
            store_size = store.size(),
            "segment opened"
        );

        Ok(Segment {
            store,
            index,
            base_offset,
            next_offset,
            config,
        })
    }

    /// Append a record and return the global offset it was assigned.
    ///
    /// This is the core write path:
    /// 1. Assign `record.offset = next_offset`
    /// 2. Encode the record
    /// 3. Append the bytes to the store (get their position)
    /// 4. Write `(next_offset - base_offset, position)` to the index
    /// 5. Increment `next_offset`
    ///
    /// ## Failure semantics:
    /// Any failure returns before step 5, so `next_offset` is untouched and
    /// the offset is handed out again on the next attempt. If step 4 fails
    /// after step 3, the store bytes are unreachable dead space.
    ///
    /// A full index is reported before anything is written to the store.
    ///
    /// # Errors
    /// - `EndOfData` when the segment cannot take another record (index
    ///   full, relative offset no longer fits in u32, or the global offset
    ///   space is exhausted). Roll over.
    /// - `Encode` if the record cannot be encoded
    /// - I/O errors from the store
    pub fn append(&mut self, record: &mut Record) -> Result<u64> {
        let current = self.next_offset;

        let relative = u32::try_from(current - self.base_offset)
            .map_err(|_| StorageError::EndOfData)?;
        let next = current.checked_add(1).ok_or(StorageError::EndOfData)?;
        if self.index.is_maxed() {
            return Err(StorageError::EndOfData);
        }

        record.offset = current;
        let bytes = record.encode()?;

        let (_, position) = self.store.append(&bytes)?;
        self.index.write(relative, position)?;

        self.next_offset = next;

        Ok(current)
    }

    /// Read the record stored at global `offset`.
    ///
    /// # Errors
    /// - `OffsetOutOfRange` if `offset < base_offset`
    /// - `EndOfData` if `offset >= next_offset`
    /// - `Decode` if the stored bytes do not decode to the requested record
    /// - I/O errors from the store
    pub fn read(&self, offset: u64) -> Result<Record> {
        let relative = offset
            .checked_sub(self.base_offset)
            .ok_or(StorageError::OffsetOutOfRange {
                offset,
                base: self.base_offset,
            })?;
        let entry = u32::try_from(relative).map_err(|_| StorageError::EndOfData)?;

        let (_, position) = self.index.read(entry)?;
        let bytes = self.store.read(position)?;
        let record = Record::decode(&bytes)?;

        if record.offset != offset {
            return Err(StorageError::Decode(format!(
                "record at position {} carries offset {}, expected {}",
                position, record.offset, offset
            )));
        }

        Ok(record)
    }

    /// True once the segment should be rolled over.
    ///
    /// Any of:
    /// - store size >= `max_store_bytes`
    /// - index size >= `max_index_bytes`
    /// - index cannot fit one more entry
    /// - `next_offset` is `u64::MAX`, so no offset is left to assign
    ///
    /// Pure query; meant to be polled after each append.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.segment.max_store_bytes
            || self.index.size() >= self.config.segment.max_index_bytes
            || self.index.is_maxed()
            || self.next_offset == u64::MAX
    }

    /// Close the segment and delete both of its files. Irreversible.
    pub fn remove(self) -> Result<()> {
        let store_path = self.store.path().to_path_buf();
        let index_path = self.index.path().to_path_buf();
        let base_offset = self.base_offset;

        self.close()?;
        fs::remove_file(&index_path)?;
        fs::remove_file(&store_path)?;

        tracing::debug!(base_offset, "segment removed");

        Ok(())
    }

    /// Close the index (sync, unmap, truncate), then the store.
    ///
    /// The segment can be reopened later with the same directory and base
    /// offset; its state is recovered from the index.
    pub fn close(self) -> Result<()> {
        let base_offset = self.base_offset;
        let next_offset = self.next_offset;

        self.index.close()?;
        self.store.close()?;

        tracing::debug!(base_offset, next_offset, "segment closed");

        Ok(())
    }

    /// Get the base offset of this segment.
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Get the offset the next append will be assigned.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Get the number of records in this segment.
    pub fn record_count(&self) -> u64 {
        self.next_offset - self.base_offset
    }

    /// Offset of the last record, or `None` if the segment is empty.
    pub fn last_offset(&self) -> Option<u64> {
        (self.next_offset > self.base_offset).then(|| self.next_offset - 1)
    }

    /// True if `offset` is held by this segment.
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.base_offset && offset < self.next_offset
    }

    /// Store size in bytes, including buffered appends.
    pub fn store_size(&self) -> u64 {
        self.store.size()
    }

    /// Logical index size in bytes.
    pub fn index_size(&self) -> u64 {
        self.index.size()
    }

    /// Path of the `.store` file.
    pub fn store_path(&self) -> &Path {
        self.store.path()
    }

    /// Path of the `.index` file.
    pub fn index_path(&self) -> &Path {
        self.index.path()
    }

    /// Raw bytes of the store, from the start, for bulk copy.
    pub fn reader(&self) -> StoreReader<'_> {
        self.store.reader()
    }

    /// Recover the base offset from a segment file name.
    ///
    /// ```rust
    /// use seglog::storage::segment::Segment;
    ///
    /// assert_eq!(Segment::parse_base_offset("logs/16.store"), Some(16));
    /// assert_eq!(Segment::parse_base_offset("16.index"), Some(16));
    /// assert_eq!(Segment::parse_base_offset("16.log"), None);
    /// ```
    pub fn parse_base_offset(path: impl AsRef<Path>) -> Option<u64> {
        let path = path.as_ref();
        let extension = path.extension()?.to_str()?;
        if extension != STORE_EXTENSION && extension != INDEX_EXTENSION {
            return None;
        }
        path.file_stem()?.to_str()?.parse().ok()
    }
}

fn segment_path(dir: &Path, base_offset: u64, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}", base_offset, extension))
}

/// Drop trailing index entries whose store entry is not fully on disk.
fn trim_unreachable_entries(store: &Store, index: &mut Index) -> Result<()> {
    let before = index.entries();
    let mut keep = before;

    while keep > 0 {
        let entry = u32::try_from(keep - 1).map_err(|_| {
            StorageError::Decode(format!("index entry {} exceeds u32 range", keep - 1))
        })?;
        let (_, position) = index.read(entry)?;
        if store_entry_complete(store, position)? {
            break;
        }
        keep -= 1;
    }

    if keep < before {
        tracing::warn!(
            index = %index.path().display(),
            dropped = before - keep,
            "index entries point past end of store, truncating"
        );
        index.truncate_entries(keep);
    }

    Ok(())
}

fn store_entry_complete(store: &Store, position: u64) -> Result<bool> {
    let size = store.size();
    if position.saturating_add(LEN_WIDTH) > size {
        return Ok(false);
    }

    let mut len_buf = [0u8; LEN_WIDTH as usize];
    store.read_at(&mut len_buf, position)?;
    let len = u64::from_be_bytes(len_buf);

    Ok(len <= size - position - LEN_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::index::ENTRY_WIDTH;

    /// Helper: create a temp directory for tests
    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().expect("failed to create temp dir")
    }

    fn config() -> Config {
        Config::with_limits(1024, 1024)
    }

    #[test]
    fn test_segment_open_new() {
        let dir = temp_dir();

        let segment = Segment::open(dir.path(), 16, config()).expect("failed to open segment");

        assert_eq!(segment.base_offset(), 16);
        assert_eq!(segment.next_offset(), 16);
        assert_eq!(segment.record_count(), 0);
        assert_eq!(segment.last_offset(), None);
        assert!(dir.path().join("16.store").exists());
        assert!(dir.path().join("16.index").exists());
        assert!(!segment.is_maxed());
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let dir = temp_dir();

        let result = Segment::open(dir.path(), 0, Config::with_limits(1024, 4));

        assert!(matches!(result, Err(StorageError::InvalidConfig(_))));
        assert!(!dir.path().join("0.store").exists());
    }

    #[test]
    fn test_append_read_roundtrip() {
        let dir = temp_dir();
        let mut segment = Segment::open(dir.path(), 0, config()).expect("failed to open segment");

        let mut record = Record::new("hello world");
        let offset = segment.append(&mut record).expect("failed to append");

        assert_eq!(offset, 0);
        assert_eq!(record.offset, 0);

        let read = segment.read(offset).expect("failed to read");
        assert_eq!(read.value, b"hello world");
        assert_eq!(read.offset, offset);
    }

    #[test]
    fn test_offsets_increment_from_base() {
        let dir = temp_dir();
        let mut segment = Segment::open(dir.path(), 100, config()).expect("failed to open segment");

        let offset1 = segment.append(&mut Record::new("record1")).expect("failed to append");
        let offset2 = segment.append(&mut Record::new("record2")).expect("failed to append");
        let offset3 = segment.append(&mut Record::new("record3")).expect("failed to append");

        assert_eq!((offset1, offset2, offset3), (100, 101, 102));
        assert_eq!(segment.next_offset(), 103);
        assert_eq!(segment.record_count(), 3);
        assert_eq!(segment.last_offset(), Some(102));
        assert!(segment.contains(101));
        assert!(!segment.contains(103));
        assert!(!segment.contains(99));
    }

    #[test]
    fn test_caller_offset_is_overwritten() {
        let dir = temp_dir();
        let mut segment = Segment::open(dir.path(), 5, config()).expect("failed to open segment");

        let mut record = Record {
            value: b"x".to_vec(),
            offset: 9999,
        };
        let offset = segment.append(&mut record).expect("failed to append");

        assert_eq!(offset, 5);
        assert_eq!(record.offset, 5);
    }

    #[test]
    fn test_sizes_track_appends() {
        let dir = temp_dir();
        let mut segment = Segment::open(dir.path(), 0, config()).expect("failed to open segment");

        let mut record = Record::new("abc");
        let encoded_len = record.encoded_len() as u64;
        segment.append(&mut record).expect("failed to append");

        assert_eq!(segment.store_size(), LEN_WIDTH + encoded_len);
        assert_eq!(segment.index_size(), ENTRY_WIDTH);
    }

    #[test]
    fn test_read_below_base_offset_fails() {
        let dir = temp_dir();
        let mut segment = Segment::open(dir.path(), 100, config()).expect("failed to open segment");
        segment.append(&mut Record::new("record")).expect("failed to append");

        match segment.read(50) {
            Err(StorageError::OffsetOutOfRange { offset, base }) => {
                assert_eq!(offset, 50);
                assert_eq!(base, 100);
            }
            other => panic!("expected OffsetOutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_read_at_or_past_next_offset_fails() {
        let dir = temp_dir();
        let mut segment = Segment::open(dir.path(), 0, config()).expect("failed to open segment");
        segment.append(&mut Record::new("only")).expect("failed to append");

        assert!(segment.read(1).unwrap_err().is_end_of_data());
        assert!(segment.read(u64::MAX).unwrap_err().is_end_of_data());
    }

    #[test]
    fn test_maxed_by_store_bytes() {
        let dir = temp_dir();
        // Each "0123456789" record is 8 + 12 + 10 = 30 store bytes.
        let mut segment = Segment::open(dir.path(), 0, Config::with_limits(60, 1024))
            .expect("failed to open segment");

        segment.append(&mut Record::new("0123456789")).expect("failed to append");
        assert!(!segment.is_maxed());

        segment.append(&mut Record::new("0123456789")).expect("failed to append");
        assert!(segment.is_maxed());
    }

    #[test]
    fn test_full_index_leaves_store_untouched() {
        let dir = temp_dir();
        let mut segment = Segment::open(dir.path(), 0, Config::with_limits(1024, 24))
            .expect("failed to open segment");

        segment.append(&mut Record::new("a")).expect("failed to append");
        segment.append(&mut Record::new("b")).expect("failed to append");
        let store_size = segment.store_size();

        let err = segment.append(&mut Record::new("c")).unwrap_err();

        assert!(err.is_end_of_data());
        assert_eq!(segment.store_size(), store_size);
        assert_eq!(segment.next_offset(), 2);
    }

    #[test]
    fn test_close_and_reopen_recovers_next_offset() {
        let dir = temp_dir();

        {
            let mut segment = Segment::open(dir.path(), 10, config()).expect("failed to open segment");
            for value in ["a", "b", "c"] {
                segment.append(&mut Record::new(value)).expect("failed to append");
            }
            segment.close().expect("failed to close");
        }

        let index_len = fs::metadata(dir.path().join("10.index"))
            .expect("failed to stat index")
            .len();
        assert_eq!(index_len, 3 * ENTRY_WIDTH);

        let mut segment = Segment::open(dir.path(), 10, config()).expect("failed to reopen segment");
        assert_eq!(segment.next_offset(), 13);
        assert_eq!(segment.read(12).expect("failed to read").value, b"c");

        let offset = segment.append(&mut Record::new("d")).expect("failed to append");
        assert_eq!(offset, 13);
    }

    #[test]
    fn test_reopen_trims_entries_past_store_end() {
        let dir = temp_dir();

        {
            let mut segment = Segment::open(dir.path(), 0, config()).expect("failed to open segment");
            segment.append(&mut Record::new("kept")).expect("failed to append");
            segment.close().expect("failed to close");
        }

        // An index entry whose store bytes never made it to disk.
        {
            let mut index = Index::open(dir.path().join("0.index"), 1024).expect("failed to open index");
            index.write(1, 10_000).expect("failed to write");
            index.close().expect("failed to close");
        }

        let segment = Segment::open(dir.path(), 0, config()).expect("failed to reopen segment");
        assert_eq!(segment.next_offset(), 1);
        assert_eq!(segment.read(0).expect("failed to read").value, b"kept");
        assert!(segment.read(1).unwrap_err().is_end_of_data());
    }

    #[test]
    fn test_remove_deletes_files() {
        let dir = temp_dir();
        let mut segment = Segment::open(dir.path(), 7, config()).expect("failed to open segment");
        segment.append(&mut Record::new("gone")).expect("failed to append");

        let store_path = segment.store_path().to_path_buf();
        let index_path = segment.index_path().to_path_buf();

        segment.remove().expect("failed to remove");

        assert!(!store_path.exists());
        assert!(!index_path.exists());
    }

    #[test]
    fn test_append_at_top_of_offset_space_fails() {
        let dir = temp_dir();
        let mut segment =
            Segment::open(dir.path(), u64::MAX, config()).expect("failed to open segment");
        assert!(segment.is_maxed());

        let err = segment.append(&mut Record::new("x")).unwrap_err();

        assert!(err.is_end_of_data());
        assert_eq!(segment.next_offset(), u64::MAX);
        assert_eq!(segment.store_size(), 0);
        assert_eq!(segment.index_size(), 0);
    }

    #[test]
    fn test_last_assignable_offset() {
        let dir = temp_dir();
        let mut segment =
            Segment::open(dir.path(), u64::MAX - 1, config()).expect("failed to open segment");

        let offset = segment.append(&mut Record::new("last")).expect("failed to append");

        assert_eq!(offset, u64::MAX - 1);
        assert_eq!(segment.next_offset(), u64::MAX);
        assert!(segment.is_maxed());
        assert!(segment.append(&mut Record::new("x")).unwrap_err().is_end_of_data());
        assert_eq!(segment.read(u64::MAX - 1).expect("failed to read").value, b"last");

        segment.close().expect("failed to close");
        let segment =
            Segment::open(dir.path(), u64::MAX - 1, config()).expect("failed to reopen segment");
        assert_eq!(segment.next_offset(), u64::MAX);
    }

    #[test]
    fn test_open_rejects_index_past_offset_space() {
        let dir = temp_dir();

        // A complete store entry at position 0, indexed as relative offset 0
        // of a segment based at u64::MAX.
        {
            let store = Store::open(dir.path().join(format!("{}.store", u64::MAX)))
                .expect("failed to open store");
            store.append(b"payload").expect("failed to append");
            store.close().expect("failed to close store");

            let mut index = Index::open(dir.path().join(format!("{}.index", u64::MAX)), 1024)
                .expect("failed to open index");
            index.write(0, 0).expect("failed to write");
            index.close().expect("failed to close index");
        }

        let result = Segment::open(dir.path(), u64::MAX, config());

        assert!(matches!(result, Err(StorageError::Decode(_))));
    }

    #[test]
    fn test_read_rejects_mismatched_record_offset() {
        let dir = temp_dir();

        {
            let mut segment = Segment::open(dir.path(), 0, config()).expect("failed to open segment");
            segment.append(&mut Record::new("first")).expect("failed to append");
            segment.append(&mut Record::new("second")).expect("failed to append");
            segment.close().expect("failed to close");
        }

        // Point entry 1 at the store position of record 0.
        {
            let mut index = Index::open(dir.path().join("0.index"), 1024).expect("failed to open index");
            index.truncate_entries(1);
            index.write(1, 0).expect("failed to write");
            index.close().expect("failed to close");
        }

        let segment = Segment::open(dir.path(), 0, config()).expect("failed to reopen segment");
        assert_eq!(segment.next_offset(), 2);
        assert_eq!(segment.read(0).expect("failed to read").value, b"first");

        match segment.read(1) {
            Err(StorageError::Decode(msg)) => assert!(msg.contains("expected 1"), "{}", msg),
            other => panic!("expected Decode, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_base_offset() {
        assert_eq!(Segment::parse_base_offset("0.store"), Some(0));
        assert_eq!(Segment::parse_base_offset("/data/12345.index"), Some(12345));
        assert_eq!(Segment::parse_base_offset("abc.store"), None);
        assert_eq!(Segment::parse_base_offset("12.tmp"), None);
        assert_eq!(Segment::parse_base_offset("12"), None);
    }
}
