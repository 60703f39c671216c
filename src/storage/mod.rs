/// Storage layer for seglog
///
/// Leaf to root:
/// - Store: append-only `.store` file of length-prefixed payloads
/// - Mmap: writable fixed-capacity mapping backing the index
/// - Index: dense `.index` file, relative offset -> store position
/// - Segment: one store + one index, global offset assignment
pub mod index;
pub mod mmap;
pub mod segment;
pub mod store;
