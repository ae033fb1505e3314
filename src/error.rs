//! Error types for segwal.
//!
//! This module defines the unified error enum used throughout the crate. All
//! fallible operations return `Result<T, Error>`; no error is swallowed or
//! logged in place of being returned.

use std::path::PathBuf;

/// Unified error type for all log operations.
///
/// Each variant represents a distinct failure mode:
///
/// - `IndexExists` -- recoverable; the write was rejected and log state is
///   unchanged.
/// - `Io` -- an underlying filesystem failure; if it occurred mid-rotation or
///   mid-append the caller should discard the log instance and re-open.
/// - `ChecksumMismatch` -- a stored record failed CRC re-verification. Fatal
///   at open time; during `get` it indicates corruption of a previously
///   well-formed record.
/// - `CorruptRecord` -- a segment contains bytes that do not form a complete
///   record sequence (truncation, garbage, partial write). Surfaced at open
///   or during [`unsafe_recover`](crate::unsafe_recover).
/// - `InvalidConfig` -- a configuration constraint was violated; nothing was
///   opened or created.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A write supplied a record index that is already present in the log.
    #[error("record with index {0} already exists")]
    IndexExists(u64),

    /// An I/O error occurred during a file operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record's checksum did not match the checksum recomputed from
    /// its fields.
    #[error("checksum mismatch for record {idx}: stored {stored:#010X}, computed {computed:#010X}")]
    ChecksumMismatch {
        /// Index of the record that failed verification.
        idx: u64,
        /// Checksum carried by the stored record.
        stored: u32,
        /// Checksum recomputed from the record's fields.
        computed: u32,
    },

    /// A segment file contains bytes that do not decode as records.
    #[error("corrupt record in {path} at byte offset {offset}: {detail}")]
    CorruptRecord {
        /// Segment file the undecodable bytes were found in.
        path: PathBuf,
        /// Byte offset of the first undecodable record.
        offset: u64,
        /// Human-readable description of the corruption.
        detail: String,
    },

    /// A configuration constraint was violated.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
