use crate::error::{Result, StorageError};

/// Size of the fixed record header: offset (8) + value length (4).
const HEADER_LEN: usize = 12;

/// A single log record.
///
/// The value is opaque to the storage layer. The offset is assigned by
/// `Segment::append`; whatever the caller put there beforehand is overwritten.
///
/// ## Encoded format
/// ```text
/// +----------+-----------+-----------------+
/// | offset   | value_len | value           |
/// | (u64 BE) | (u32 BE)  | ([u8]; value_len) |
/// | 8 bytes  | 4 bytes   | variable        |
/// +----------+-----------+-----------------+
/// ```
///
/// The encoded bytes are the payload of one store entry; the store adds its
/// own 8-byte length prefix around them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// Record payload bytes.
    pub value: Vec<u8>,
    /// Global offset assigned when this record was appended.
    pub offset: u64,
}

impl Record {
    /// Build an unassigned record (offset 0) around a value.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            offset: 0,
        }
    }

    /// Number of bytes `encode` will produce.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.value.len()
    }

    /// Encode this record into a fresh buffer.
    ///
    /// # Errors
    /// - `Encode` if the value is longer than a u32 length field can describe
    pub fn encode(&self) -> Result<Vec<u8>> {
        let value_len = u32::try_from(self.value.len()).map_err(|_| {
            StorageError::Encode(format!(
                "record value of {} bytes exceeds u32 length field",
                self.value.len()
            ))
        })?;

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.offset.to_be_bytes());
        buf.extend_from_slice(&value_len.to_be_bytes());
        buf.extend_from_slice(&self.value);

        Ok(buf)
    }

    /// Decode a record from exactly the bytes `encode` produced.
    ///
    /// # Errors
    /// - `Decode` on a truncated header, truncated value, or trailing bytes
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(StorageError::Decode(format!(
                "record header truncated: {} of {} bytes",
                buf.len(),
                HEADER_LEN
            )));
        }

        let offset = u64::from_be_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]);
        let value_len = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;

        let body = &buf[HEADER_LEN..];
        if body.len() < value_len {
            return Err(StorageError::Decode(format!(
                "record value truncated: expected {} bytes, found {}",
                value_len,
                body.len()
            )));
        }
        if body.len() > value_len {
            return Err(StorageError::Decode(format!(
                "{} trailing bytes after record value",
                body.len() - value_len
            )));
        }

        Ok(Record {
            value: body.to_vec(),
            offset,
        })
    }
}
