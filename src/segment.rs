//! Segment file handling: discovery, loading, and verified reads.
//!
//! A segment is a plain file named `<prefix><ordinal>` holding concatenated
//! codec frames. This module discovers segments on disk, replays them
//! through the codec to rebuild index maps, and provides the read-only
//! decode used by eviction and recovery. Rotation policy lives with the
//! facade in [`wal`](crate::wal).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::codec::RecordStream;
use crate::error::Error;
use crate::types::Record;

/// Path of the segment with the given ordinal.
pub(crate) fn segment_path(dir: &Path, prefix: &str, ordinal: u64) -> PathBuf {
    dir.join(format!("{prefix}{ordinal}"))
}

/// Discover segment ordinals in `dir`.
///
/// Creates `dir` if it does not exist. Lists regular files whose name starts
/// with `prefix` and parses the remainder of each name as a decimal ordinal;
/// files that match the prefix but do not parse fail the whole scan. Foreign
/// files are ignored.
///
/// Returns ordinals sorted ascending. When no segment exists yet, returns
/// `[0]` so that the opener behaves uniformly for first-time initialization.
pub(crate) fn scan_segments(dir: &Path, prefix: &str) -> Result<Vec<u64>, Error> {
    std::fs::create_dir_all(dir)?;

    let mut ordinals = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(suffix) = name.strip_prefix(prefix) else {
            continue;
        };

        let ordinal = suffix.parse::<u64>().map_err(|e| {
            Error::InvalidConfig(format!(
                "segment file {name} does not end in a decimal ordinal: {e}"
            ))
        })?;
        ordinals.push(ordinal);
    }

    ordinals.sort_unstable();
    if ordinals.is_empty() {
        ordinals.push(0);
    }

    Ok(ordinals)
}

/// Open one segment and replay its records into an index map.
///
/// The file is opened in append+read mode and created if missing. Its size
/// on entry becomes `last_offset`, telling the facade where the next append
/// lands. Every record is decoded and checksum-verified; the first checksum
/// mismatch, decode error, or truncated trailing record aborts the load.
/// Nothing is truncated or repaired here.
///
/// # Errors
///
/// Returns [`Error::Io`] on filesystem failures, [`Error::CorruptRecord`]
/// when the file does not decode cleanly, and [`Error::ChecksumMismatch`]
/// when a decoded record fails verification.
pub(crate) fn load_segment(path: &Path) -> Result<(File, u64, HashMap<u64, Record>), Error> {
    let file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?;
    let data = std::fs::read(path)?;
    let last_offset = data.len() as u64;

    let records = decode_verified(&data, path)?;
    let mut index = HashMap::with_capacity(records.len());
    for record in records {
        index.insert(record.idx, record);
    }

    tracing::debug!(
        segment = %path.display(),
        records = index.len(),
        bytes = last_offset,
        "loaded segment"
    );

    Ok((file, last_offset, index))
}

/// Load a run of segments in ordinal order and merge their records.
///
/// Each predecessor file is closed after its records are extracted; the file
/// returned is the active segment (largest ordinal) and stays open with its
/// size as `last_offset`. Later segments win on duplicate indices, matching
/// write-time order.
pub(crate) fn load_segments(
    ordinals: &[u64],
    dir: &Path,
    prefix: &str,
) -> Result<(File, u64, HashMap<u64, Record>), Error> {
    let mut index = HashMap::new();
    let mut active = None;

    for &ordinal in ordinals {
        let path = segment_path(dir, prefix, ordinal);
        let (file, last_offset, segment_index) = load_segment(&path)?;
        index.extend(segment_index);
        // Dropping the previous handle closes it; only the newest stays open.
        active = Some((file, last_offset));
    }

    let (file, last_offset) = active.expect("scan always yields at least one ordinal");
    Ok((file, last_offset, index))
}

/// Read and verify every record of one segment without opening it for write.
///
/// Used by eviction (to learn which indices leave the in-memory index) and
/// by recovery probing. The file must exist.
pub(crate) fn read_segment_records(path: &Path) -> Result<Vec<Record>, Error> {
    let data = std::fs::read(path)?;
    decode_verified(&data, path)
}

/// Decode a whole segment image, verifying each record's checksum.
fn decode_verified(data: &[u8], path: &Path) -> Result<Vec<Record>, Error> {
    let mut records = Vec::new();
    for result in RecordStream::new(data) {
        let record = result.map_err(|e| match e {
            // The codec does not know which file it is decoding; attach it.
            Error::CorruptRecord { offset, detail, .. } => Error::CorruptRecord {
                path: path.to_path_buf(),
                offset,
                detail,
            },
            other => other,
        })?;
        record.verify()?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_record;

    use std::io::Write;

    use bytes::Bytes;

    fn make_record(idx: u64, key: &str, value: &[u8]) -> Record {
        Record::new(idx, key.to_string(), Bytes::copy_from_slice(value))
    }

    /// Helper: write the given records as one segment file.
    fn seed_segment(path: &Path, records: &[Record]) {
        let mut file = File::create(path).expect("create seed segment");
        for record in records {
            file.write_all(&encode_record(record)).expect("write record");
        }
        file.sync_all().expect("sync seed segment");
    }

    #[test]
    fn scan_empty_directory_returns_single_zero() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let ordinals = scan_segments(dir.path(), "wal_").expect("scan should succeed");
        assert_eq!(ordinals, vec![0]);
    }

    #[test]
    fn scan_creates_missing_directory() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let nested = dir.path().join("logs");
        assert!(!nested.exists());

        scan_segments(&nested, "wal_").expect("scan should create the directory");
        assert!(nested.is_dir());
    }

    #[test]
    fn scan_returns_sorted_ordinals() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        for ordinal in [10u64, 2, 0, 7] {
            std::fs::write(dir.path().join(format!("wal_{ordinal}")), b"").expect("seed");
        }

        let ordinals = scan_segments(dir.path(), "wal_").expect("scan should succeed");
        assert_eq!(ordinals, vec![0, 2, 7, 10]);
    }

    #[test]
    fn scan_ignores_foreign_files_and_directories() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        std::fs::write(dir.path().join("wal_0"), b"").expect("seed segment");
        std::fs::write(dir.path().join("notes.txt"), b"unrelated").expect("seed foreign");
        std::fs::create_dir(dir.path().join("wal_subdir")).expect("seed dir");

        let ordinals = scan_segments(dir.path(), "wal_").expect("scan should succeed");
        assert_eq!(ordinals, vec![0]);
    }

    #[test]
    fn scan_fails_on_unparseable_suffix() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        std::fs::write(dir.path().join("wal_0"), b"").expect("seed segment");
        std::fs::write(dir.path().join("wal_abc"), b"").expect("seed bad name");

        assert!(matches!(
            scan_segments(dir.path(), "wal_"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn load_segment_creates_missing_file() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("wal_0");

        let (_file, last_offset, index) = load_segment(&path).expect("load should succeed");
        assert!(path.exists());
        assert_eq!(last_offset, 0);
        assert!(index.is_empty());
    }

    #[test]
    fn load_segment_rebuilds_index_and_offset() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("wal_0");
        let records = vec![
            make_record(0, "key0", b"value0"),
            make_record(1, "key1", b"value1"),
            make_record(2, "key2", b"value2"),
        ];
        seed_segment(&path, &records);
        let expected_size = std::fs::metadata(&path).expect("metadata").len();

        let (_file, last_offset, index) = load_segment(&path).expect("load should succeed");
        assert_eq!(last_offset, expected_size);
        assert_eq!(index.len(), 3);
        for record in &records {
            assert_eq!(index.get(&record.idx), Some(record));
        }
    }

    #[test]
    fn load_segment_rejects_trailing_garbage() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("wal_0");
        seed_segment(&path, &[make_record(0, "key0", b"value0")]);

        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("open for append");
        file.write_all(b"corrupted data").expect("append garbage");
        file.sync_all().expect("sync");

        match load_segment(&path) {
            Err(Error::CorruptRecord { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected CorruptRecord, got: {other:?}"),
        }
    }

    #[test]
    fn load_segment_rejects_flipped_bit() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("wal_0");
        seed_segment(&path, &[make_record(0, "key0", b"value0")]);

        let mut data = std::fs::read(&path).expect("read segment");
        let flip_at = data.len() - 9; // inside the value, before the checksum
        data[flip_at] ^= 0x01;
        std::fs::write(&path, &data).expect("write corrupted segment");

        assert!(matches!(
            load_segment(&path),
            Err(Error::ChecksumMismatch { idx: 0, .. })
        ));
    }

    #[test]
    fn load_segments_merges_in_ordinal_order() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        seed_segment(
            &segment_path(dir.path(), "wal_", 0),
            &[make_record(0, "key0", b"value0"), make_record(1, "key1", b"value1")],
        );
        seed_segment(
            &segment_path(dir.path(), "wal_", 1),
            &[make_record(2, "key2", b"value2")],
        );

        let (_file, last_offset, index) =
            load_segments(&[0, 1], dir.path(), "wal_").expect("load should succeed");

        assert_eq!(index.len(), 3);
        // The returned offset belongs to the active (last) segment.
        let active_size = std::fs::metadata(segment_path(dir.path(), "wal_", 1))
            .expect("metadata")
            .len();
        assert_eq!(last_offset, active_size);
    }

    #[test]
    fn read_segment_records_preserves_append_order() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("wal_0");
        // Appended out of idx order on purpose.
        let records = vec![
            make_record(5, "key5", b"value5"),
            make_record(3, "key3", b"value3"),
        ];
        seed_segment(&path, &records);

        let read = read_segment_records(&path).expect("read should succeed");
        assert_eq!(read, records);
    }

    #[test]
    fn read_segment_records_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("wal_9");
        assert!(matches!(
            read_segment_records(&path),
            Err(Error::Io(_))
        ));
    }
}
