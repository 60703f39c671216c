//! seglog: segmented commit-log storage.
//!
//! A log is a sequence of segments. Each segment pairs an append-only
//! `.store` file with a memory-mapped `.index` file and hands out
//! contiguous global offsets. Rolling segments over, retention and
//! transport belong to the caller.
//!
//! ```rust,no_run
//! use seglog::{config::Config, record::Record, storage::segment::Segment};
//!
//! # fn main() -> seglog::error::Result<()> {
//! let mut segment = Segment::open("/var/lib/seglog", 0, Config::default())?;
//! let offset = segment.append(&mut Record::new("hello"))?;
//! assert_eq!(segment.read(offset)?.value, b"hello");
//! if segment.is_maxed() {
//!     let next = segment.next_offset();
//!     segment.close()?;
//!     segment = Segment::open("/var/lib/seglog", next, Config::default())?;
//! }
//! # let _ = segment;
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod error;
pub mod record;
pub mod storage;
