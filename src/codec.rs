//! Binary codec for segment files.
//!
//! This module handles serialization and deserialization of individual log
//! records. It is pure data transformation -- no file I/O, no locking, no
//! index management.
//!
//! Each record is a length-prefixed binary frame with explicit little-endian
//! fields, carrying the record's CRC-32 checksum inside the frame:
//!
//! ```text
//! u32 LE  body_len     byte count from idx through checksum (inclusive)
//! u64 LE  idx
//! u32 LE  key_len      followed by key_len bytes of UTF-8 key
//! u32 LE  value_len    followed by value_len bytes of opaque value
//! u32 LE  checksum     CRC-32 over idx (LE) || key || value
//! ```
//!
//! The encoding is stable across runs; a segment file is a plain
//! concatenation of these frames with no file header and no trailing marker.

use bytes::Bytes;

use crate::error::Error;
use crate::types::Record;

/// Size of the length prefix field in bytes.
const LENGTH_PREFIX_SIZE: usize = 4;

/// Fixed-size portion of a record body (everything except key and value):
/// idx(8) + key_len(4) + value_len(4) + checksum(4) = 20.
const FIXED_BODY_SIZE: usize = 8 + 4 + 4 + 4;

/// Result of attempting to decode a record from a byte buffer.
///
/// Distinguishes between a successfully decoded value and a buffer that does
/// not contain enough bytes to form a complete frame. The distinction matters
/// for crash handling: a truncated trailing frame is what a partial append
/// leaves behind, whereas inconsistent field lengths inside a complete frame
/// indicate corruption.
#[derive(Debug)]
pub enum DecodeOutcome<T> {
    /// A full value was successfully decoded from the buffer.
    Complete {
        /// The decoded value.
        value: T,
        /// Total number of bytes consumed from the buffer.
        consumed: usize,
    },
    /// The buffer does not contain enough bytes to form a complete frame.
    Incomplete,
}

/// Encode a [`Record`] into the binary on-disk format.
///
/// The returned buffer contains the length prefix and all four record
/// fields; the caller can append it directly to a segment file.
pub fn encode_record(record: &Record) -> Vec<u8> {
    let key_bytes = record.key.as_bytes();
    let body_len = FIXED_BODY_SIZE + key_bytes.len() + record.value.len();

    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + body_len);
    buf.extend_from_slice(&(body_len as u32).to_le_bytes());
    buf.extend_from_slice(&record.idx.to_le_bytes());
    buf.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(key_bytes);
    buf.extend_from_slice(&(record.value.len() as u32).to_le_bytes());
    buf.extend_from_slice(&record.value);
    buf.extend_from_slice(&record.checksum.to_le_bytes());

    buf
}

/// Decode a single record from the start of a byte buffer.
///
/// Handles three cases:
///
/// 1. **Complete record** -- returns [`DecodeOutcome::Complete`] with the
///    decoded record and the total number of bytes consumed.
/// 2. **Incomplete data** -- the buffer is too short to contain a full frame
///    (fewer than 4 bytes for the length prefix, or fewer bytes than the
///    prefix promises). Returns [`DecodeOutcome::Incomplete`].
/// 3. **Corrupt data** -- the field lengths inside the frame are
///    inconsistent, or the key is not valid UTF-8.
///
/// The record's checksum is parsed but deliberately not verified here; it is
/// defined over the logical fields rather than the wire bytes, and callers
/// verify it via [`Record::verify`] at load, read, and recovery time.
///
/// # Errors
///
/// Returns [`Error::CorruptRecord`] (with `offset` relative to the start of
/// `buf`) if the frame is internally inconsistent or the key is malformed.
pub fn decode_record(buf: &[u8]) -> Result<DecodeOutcome<Record>, Error> {
    let corrupt = |detail: String| Error::CorruptRecord {
        path: Default::default(),
        offset: 0,
        detail,
    };

    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(DecodeOutcome::Incomplete);
    }

    let body_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let total = LENGTH_PREFIX_SIZE + body_len;
    if buf.len() < total {
        return Ok(DecodeOutcome::Incomplete);
    }

    if body_len < FIXED_BODY_SIZE {
        return Err(corrupt(format!(
            "record body too short: {body_len} bytes"
        )));
    }

    let body = &buf[LENGTH_PREFIX_SIZE..total];
    let mut cursor = 0;

    let idx = u64::from_le_bytes(body[cursor..cursor + 8].try_into().expect("8 bytes for u64"));
    cursor += 8;

    let key_len = u32::from_le_bytes(
        body[cursor..cursor + 4]
            .try_into()
            .expect("4 bytes for u32"),
    ) as usize;
    cursor += 4;

    // key + value_len(4) + value + checksum(4) must fit in the remaining body.
    if key_len + 8 > body.len() - cursor {
        return Err(corrupt(format!(
            "key length {key_len} exceeds record body"
        )));
    }
    let key = std::str::from_utf8(&body[cursor..cursor + key_len])
        .map_err(|e| corrupt(format!("invalid UTF-8 in key: {e}")))?
        .to_string();
    cursor += key_len;

    let value_len = u32::from_le_bytes(
        body[cursor..cursor + 4]
            .try_into()
            .expect("4 bytes for u32"),
    ) as usize;
    cursor += 4;

    if value_len + 4 != body.len() - cursor {
        return Err(corrupt(format!(
            "value length {value_len} inconsistent with record body"
        )));
    }
    let value = Bytes::copy_from_slice(&body[cursor..cursor + value_len]);
    cursor += value_len;

    let checksum = u32::from_le_bytes(
        body[cursor..cursor + 4]
            .try_into()
            .expect("4 bytes for u32"),
    );

    Ok(DecodeOutcome::Complete {
        value: Record {
            idx,
            key,
            value,
            checksum,
        },
        consumed: total,
    })
}

/// Streaming decoder over a byte buffer: yields records one at a time until
/// the buffer is exhausted.
///
/// Trailing bytes that do not form a complete record (a partial append, or
/// garbage) are surfaced as a decode error rather than silently dropped.
/// After the first error the stream is exhausted.
pub struct RecordStream<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> RecordStream<'a> {
    /// Create a stream over the full contents of a segment.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            failed: false,
        }
    }

    /// Byte offset of the next undecoded record.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for RecordStream<'_> {
    type Item = Result<Record, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }

        match decode_record(&self.buf[self.offset..]) {
            Ok(DecodeOutcome::Complete { value, consumed }) => {
                self.offset += consumed;
                Some(Ok(value))
            }
            Ok(DecodeOutcome::Incomplete) => {
                // Bytes remain but no complete frame: a torn trailing write.
                self.failed = true;
                Some(Err(Error::CorruptRecord {
                    path: Default::default(),
                    offset: self.offset as u64,
                    detail: format!(
                        "truncated record: {} trailing bytes do not form a complete frame",
                        self.buf.len() - self.offset
                    ),
                }))
            }
            Err(Error::CorruptRecord { detail, .. }) => {
                self.failed = true;
                Some(Err(Error::CorruptRecord {
                    path: Default::default(),
                    offset: self.offset as u64,
                    detail,
                }))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
