use crate::error::{Result, StorageError};
use crate::storage::index::ENTRY_WIDTH;
use serde::Deserialize;

/// Storage configuration.
///
/// Every limit is passed explicitly to the segment that uses it; nothing in
/// the storage layer reads environment variables or config files on its own.
/// The struct derives `Deserialize` so an embedding service can load it from
/// its own config source:
///
/// ```rust
/// let config: seglog::config::Config = serde_json::from_str(
///     r#"{ "segment": { "max_store_bytes": 1024, "max_index_bytes": 36 } }"#,
/// ).unwrap();
/// assert_eq!(config.segment.max_index_bytes, 36);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub segment: SegmentConfig,
}

/// Per-segment size limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Rollover threshold for the `.store` file.
    /// The segment reports maxed once the store reaches this many bytes.
    pub max_store_bytes: u64,

    /// Size the `.index` file is preallocated and mapped to while open.
    /// Also a rollover threshold: capacity is `max_index_bytes / 12` entries.
    pub max_index_bytes: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: 1024 * 1024 * 1024, // 1 GiB
            max_index_bytes: 10 * 1024 * 1024,   // 10 MiB
        }
    }
}

impl Config {
    /// Config with the given segment limits.
    pub fn with_limits(max_store_bytes: u64, max_index_bytes: u64) -> Self {
        Self {
            segment: SegmentConfig {
                max_store_bytes,
                max_index_bytes,
            },
        }
    }

    /// Reject limits no segment could operate under.
    ///
    /// # Errors
    /// - `max_store_bytes` is zero
    /// - `max_index_bytes` cannot hold a single index entry
    /// - `max_index_bytes` does not fit the address space (cannot be mapped)
    pub fn validate(&self) -> Result<()> {
        if self.segment.max_store_bytes == 0 {
            return Err(StorageError::InvalidConfig(
                "max_store_bytes must be greater than zero".to_string(),
            ));
        }

        if self.segment.max_index_bytes < ENTRY_WIDTH {
            return Err(StorageError::InvalidConfig(format!(
                "max_index_bytes {} cannot hold one {}-byte index entry",
                self.segment.max_index_bytes, ENTRY_WIDTH
            )));
        }

        if usize::try_from(self.segment.max_index_bytes).is_err() {
            return Err(StorageError::InvalidConfig(format!(
                "max_index_bytes {} exceeds the addressable size",
                self.segment.max_index_bytes
            )));
        }

        Ok(())
    }
}
