/// Storage-level errors
/// These represent failures in the store, index and segment operations.
///
/// Nothing in the storage layer retries or swallows an error: every variant
/// is handed back to the caller, which owns rotation and retry decisions.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// No such index entry, or no room left in the index for another entry.
    ///
    /// On the write path this is the rollover signal, not a fatal error.
    #[error("end of data")]
    EndOfData,

    #[error("offset out of range: requested {offset}, segment base {base}")]
    OffsetOutOfRange { offset: u64, base: u64 },

    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// True when the error means "nothing more here": a read past the last
    /// entry, or a write into a full index.
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, StorageError::EndOfData)
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
