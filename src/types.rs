//! Core domain types for segwal.
//!
//! This module defines the record stored in the log, the configuration
//! surface of [`Wal::open`](crate::Wal::open), and the tombstone marker
//! value.

use std::path::PathBuf;

use bytes::Bytes;

use crate::error::Error;

/// Value bytes of a tombstone record.
///
/// A tombstone logically invalidates a previous record under the same index
/// while preserving its key. It is an ordinary record on disk; only its
/// value marks it as a deletion.
pub const TOMBSTONE: &[u8] = b"tombstone";

/// A single log record: the unit written and read.
///
/// Records are identified by a caller-supplied `idx` that is unique within
/// the log. The `checksum` is a CRC-32 (IEEE polynomial) over the canonical
/// concatenation of `idx` as 8 little-endian bytes, the raw `key` bytes, and
/// the raw `value` bytes. The checksum field itself is not part of the hash
/// input, so a record can be re-verified from its fields at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Caller-supplied record index, unique within the log.
    pub idx: u64,
    /// UTF-8 key.
    pub key: String,
    /// Opaque value bytes.
    pub value: Bytes,
    /// CRC-32 over `idx` (little-endian) || `key` || `value`.
    pub checksum: u32,
}

impl Record {
    /// Build a record, computing its checksum from the other fields.
    pub fn new(idx: u64, key: String, value: Bytes) -> Self {
        let checksum = compute_checksum(idx, &key, &value);
        Self {
            idx,
            key,
            value,
            checksum,
        }
    }

    /// Re-verify the stored checksum against one recomputed from the fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChecksumMismatch`] when the stored checksum differs
    /// from the recomputed one.
    pub fn verify(&self) -> Result<(), Error> {
        let computed = compute_checksum(self.idx, &self.key, &self.value);
        if self.checksum != computed {
            return Err(Error::ChecksumMismatch {
                idx: self.idx,
                stored: self.checksum,
                computed,
            });
        }
        Ok(())
    }

    /// Whether this record is a tombstone (its value equals the tombstone
    /// marker bytes).
    pub fn is_tombstone(&self) -> bool {
        self.value.as_ref() == TOMBSTONE
    }
}

/// Compute the CRC-32 (IEEE) checksum of a record's fields.
///
/// The hash input is `idx` encoded as 8 little-endian bytes, followed by the
/// raw `key` bytes, followed by the raw `value` bytes. CRC-32 is chosen for
/// speed and sufficiency against storage corruption, not against adversarial
/// tampering.
pub fn compute_checksum(idx: u64, key: &str, value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&idx.to_le_bytes());
    hasher.update(key.as_bytes());
    hasher.update(value);
    hasher.finalize()
}

/// Configuration for opening a [`Wal`](crate::Wal).
///
/// # Fields
///
/// * `dir` - Directory for segment files; created if absent.
/// * `prefix` - Segment filename prefix. Must include a trailing separator
///   (e.g. `"wal_"`) so the ordinal suffix parses unambiguously.
/// * `segments_threshold` - Rotate the active segment once its record count
///   reaches this value. Must be at least 1.
/// * `max_segments` - Retain at most this many segments; on exceeding, the
///   oldest is evicted during rotation. Must be at least 1.
/// * `sync_mode` - When true, every successful append is followed by an
///   fsync before the operation returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory for segment files; created if absent.
    pub dir: PathBuf,
    /// Segment filename prefix, e.g. `"wal_"`.
    pub prefix: String,
    /// Records per segment before rotation.
    pub segments_threshold: usize,
    /// Retention cap in segments.
    pub max_segments: u64,
    /// Fsync after every append.
    pub sync_mode: bool,
}

impl Config {
    /// Validate the configuration constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when `segments_threshold` or
    /// `max_segments` is zero, or when `prefix` is empty.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.segments_threshold == 0 {
            return Err(Error::InvalidConfig(
                "segments_threshold must be at least 1".to_string(),
            ));
        }
        if self.max_segments == 0 {
            return Err(Error::InvalidConfig(
                "max_segments must be at least 1".to_string(),
            ));
        }
        if self.prefix.is_empty() {
            return Err(Error::InvalidConfig(
                "prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            dir: PathBuf::from("./wal"),
            prefix: "wal_".to_string(),
            segments_threshold: 10,
            max_segments: 5,
            sync_mode: false,
        }
    }

    #[test]
    fn new_record_computes_matching_checksum() {
        let record = Record::new(3, "key3".to_string(), Bytes::from_static(b"value3"));
        assert_eq!(
            record.checksum,
            compute_checksum(3, "key3", b"value3"),
            "constructor checksum should match compute_checksum"
        );
        record.verify().expect("fresh record should verify");
    }

    #[test]
    fn checksum_covers_idx_little_endian() {
        // The same key and value under a different idx must hash differently,
        // and the idx must enter the hash in little-endian byte order.
        let a = compute_checksum(1, "k", b"v");
        let b = compute_checksum(2, "k", b"v");
        assert_ne!(a, b);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&1u64.to_le_bytes());
        hasher.update(b"k");
        hasher.update(b"v");
        assert_eq!(a, hasher.finalize());
    }

    #[test]
    fn verify_rejects_tampered_value() {
        let mut record = Record::new(9, "key".to_string(), Bytes::from_static(b"original"));
        record.value = Bytes::from_static(b"tampered");

        match record.verify() {
            Err(Error::ChecksumMismatch { idx, .. }) => assert_eq!(idx, 9),
            other => panic!("expected ChecksumMismatch, got: {other:?}"),
        }
    }

    #[test]
    fn verify_rejects_tampered_checksum_field() {
        let mut record = Record::new(0, "key".to_string(), Bytes::from_static(b"value"));
        record.checksum ^= 0x1;
        assert!(record.verify().is_err());
    }

    #[test]
    fn tombstone_detection() {
        let dead = Record::new(1, "k".to_string(), Bytes::from_static(TOMBSTONE));
        let live = Record::new(2, "k".to_string(), Bytes::from_static(b"value"));
        assert!(dead.is_tombstone());
        assert!(!live.is_tombstone());
    }

    #[test]
    fn config_validate_accepts_minimal_settings() {
        let mut cfg = config();
        cfg.segments_threshold = 1;
        cfg.max_segments = 1;
        cfg.validate().expect("minimal config should be valid");
    }

    #[test]
    fn config_validate_rejects_zero_threshold() {
        let mut cfg = config();
        cfg.segments_threshold = 0;
        match cfg.validate() {
            Err(Error::InvalidConfig(msg)) => {
                assert!(
                    msg.contains("segments_threshold"),
                    "expected 'segments_threshold' in: {msg}"
                );
            }
            other => panic!("expected InvalidConfig, got: {other:?}"),
        }
    }

    #[test]
    fn config_validate_rejects_zero_max_segments() {
        let mut cfg = config();
        cfg.max_segments = 0;
        match cfg.validate() {
            Err(Error::InvalidConfig(msg)) => {
                assert!(
                    msg.contains("max_segments"),
                    "expected 'max_segments' in: {msg}"
                );
            }
            other => panic!("expected InvalidConfig, got: {other:?}"),
        }
    }

    #[test]
    fn config_validate_rejects_empty_prefix() {
        let mut cfg = config();
        cfg.prefix = String::new();
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
    }
}
