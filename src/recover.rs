//! Destructive offline recovery: discard segments that fail verification.
//!
//! A log whose open fails with a decode or checksum error can be brought
//! back by removing the damaged segments and accepting the data loss. This
//! pass never repairs a partial segment, it only unlinks it; run it before
//! a normal [`Wal::open`](crate::Wal::open), never concurrently with one.

use std::path::{Path, PathBuf};

use crate::codec::RecordStream;
use crate::error::Error;
use crate::segment;

/// Remove every segment under `dir`/`prefix` whose contents do not decode
/// and checksum-verify cleanly, and every empty segment.
///
/// Returns the paths of the removed files. Segments that verify are left
/// untouched, so a subsequent open observes exactly the surviving records.
///
/// # Errors
///
/// Returns [`Error::Io`] when the directory cannot be scanned or a damaged
/// segment cannot be unlinked. Decode and checksum failures are not errors
/// here; they are what marks a segment for removal.
pub fn unsafe_recover(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, Error> {
    let ordinals = segment::scan_segments(dir, prefix)?;

    let mut removed = Vec::new();
    for ordinal in ordinals {
        let path = segment::segment_path(dir, prefix, ordinal);

        let data = match std::fs::read(&path) {
            Ok(data) => data,
            // The scanner reports ordinal 0 even for an empty directory;
            // there is nothing to probe in that case.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        if !data.is_empty() && segment_is_intact(&data) {
            continue;
        }

        std::fs::remove_file(&path)?;
        tracing::warn!(
            segment = %path.display(),
            bytes = data.len(),
            "removed unrecoverable segment"
        );
        removed.push(path);
    }

    Ok(removed)
}

/// Whether every record in the segment image decodes and verifies.
fn segment_is_intact(data: &[u8]) -> bool {
    RecordStream::new(data).all(|result| match result {
        Ok(record) => record.verify().is_ok(),
        Err(_) => false,
    })
}
