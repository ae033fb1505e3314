//! The log facade: open, write, tombstone, read, iterate, close.
//!
//! This module owns the dual in-memory index and the active segment file,
//! and serializes concurrent access. A single `RwLock` guards all mutable
//! state: writes, tombstones, and rotation take the write lock; reads and
//! iteration take the read lock; [`Wal::current_index`] reads a lock-free
//! atomic. All I/O runs synchronously under the exclusive lock -- there is
//! no background thread.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use bytes::Bytes;

use crate::codec;
use crate::error::Error;
use crate::segment;
use crate::types::{Config, Record, TOMBSTONE};

/// A segmented, append-only, crash-safe write-ahead log.
///
/// The log maps caller-supplied `u64` record indices to `(key, value)`
/// payloads. Records are appended to an active segment file; once the
/// segment holds `segments_threshold` records it is closed and a new one is
/// opened, and once `max_segments` segments exist the oldest is evicted
/// (unlinked, and its records dropped from the index).
///
/// A `Wal` is designed to be shared across threads behind an `Arc`. The
/// segment directory is assumed to be owned by one instance at a time;
/// two instances over the same directory and prefix are undefined behavior.
#[derive(Debug)]
pub struct Wal {
    /// All mutable state, guarded by one readers-writer lock.
    inner: RwLock<WalInner>,
    /// Highest record index observed since open; read without the lock.
    last_index: AtomicU64,
}

/// State behind the facade's lock.
#[derive(Debug)]
struct WalInner {
    /// Active segment file handle, positioned at end-of-file.
    log: File,
    /// Records of all closed segments, keyed by record index.
    index: HashMap<u64, Record>,
    /// Records of the active segment only. Its size is exactly the record
    /// count of the active segment, which drives the rotation predicate.
    tmp_index: HashMap<u64, Record>,
    /// Byte offset where the next append lands.
    last_offset: u64,
    /// Count of segments ever created: one past the active ordinal.
    segments_number: u64,
    /// Opening configuration (directory, prefix, thresholds, sync mode).
    config: Config,
}

impl Wal {
    /// Open (or create) the log described by `config`.
    ///
    /// Discovers segment files under `config.dir`, replays each through the
    /// codec verifying every checksum, and rebuilds the in-memory index.
    /// On success the index reflects all durable records, the temporary
    /// index is empty, and the active segment (largest ordinal) is open and
    /// positioned at end-of-file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for invalid settings, [`Error::Io`]
    /// on directory or segment I/O failures, and [`Error::CorruptRecord`] /
    /// [`Error::ChecksumMismatch`] when a segment fails integrity checks.
    /// In the corrupt case the caller may run
    /// [`unsafe_recover`](crate::unsafe_recover) and retry.
    pub fn open(config: Config) -> Result<Wal, Error> {
        config.validate()?;

        let ordinals = segment::scan_segments(&config.dir, &config.prefix)?;
        let (log, last_offset, index) =
            segment::load_segments(&ordinals, &config.dir, &config.prefix)?;

        let active_ordinal = *ordinals.last().expect("scan yields at least one ordinal");
        let last_index = index.keys().copied().max().unwrap_or(0);

        tracing::debug!(
            dir = %config.dir.display(),
            segments = ordinals.len(),
            records = index.len(),
            active = active_ordinal,
            "opened log"
        );

        Ok(Wal {
            inner: RwLock::new(WalInner {
                log,
                index,
                tmp_index: HashMap::new(),
                last_offset,
                segments_number: active_ordinal + 1,
                config,
            }),
            last_index: AtomicU64::new(last_index),
        })
    }

    /// Append a `(key, value)` record under a previously unused index.
    ///
    /// Rotation is evaluated first: when the active segment already holds
    /// `segments_threshold` records it is closed, the oldest segment is
    /// evicted if the retention cap is reached, and a fresh segment is
    /// opened. The record is then encoded with its checksum, appended, and
    /// fsynced when `sync_mode` is set.
    ///
    /// Indices are not required to be contiguous or monotonic; any unused
    /// index is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexExists`] (before any I/O) when `idx` is already
    /// present, or [`Error::Io`] on filesystem failures -- in which case the
    /// in-memory index is left unchanged.
    pub fn write(&self, idx: u64, key: &str, value: &[u8]) -> Result<(), Error> {
        let mut inner = self.inner.write().expect("wal lock poisoned");

        if inner.index.contains_key(&idx) || inner.tmp_index.contains_key(&idx) {
            return Err(Error::IndexExists(idx));
        }

        inner.rotate_if_needed()?;

        let record = Record::new(idx, key.to_string(), Bytes::copy_from_slice(value));
        inner.append_record(&record)?;
        inner.tmp_index.insert(idx, record);

        self.last_index.fetch_max(idx, Ordering::Relaxed);

        Ok(())
    }

    /// Logically invalidate the record at `idx` by appending a tombstone.
    ///
    /// The tombstone keeps the original key and index but carries the
    /// literal value [`TOMBSTONE`]. Subsequent reads and iteration observe
    /// only the tombstone. Writing a tombstone for an index that was never
    /// written succeeds without any I/O. The highest observed index is not
    /// decremented by a tombstone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if rotation or the append fails.
    pub fn write_tombstone(&self, idx: u64) -> Result<(), Error> {
        let mut inner = self.inner.write().expect("wal lock poisoned");

        let key = match inner.tmp_index.get(&idx).or_else(|| inner.index.get(&idx)) {
            Some(record) => record.key.clone(),
            None => return Ok(()),
        };

        inner.rotate_if_needed()?;

        let record = Record::new(idx, key, Bytes::from_static(TOMBSTONE));
        inner.append_record(&record)?;

        // The tombstone supersedes the original record in memory; the dual
        // index stays disjoint.
        inner.index.remove(&idx);
        inner.tmp_index.insert(idx, record);

        Ok(())
    }

    /// Look up the `(key, value)` stored under `idx`.
    ///
    /// The stored record's checksum is re-verified on every hit, so silent
    /// corruption of a previously well-formed record is detected at read
    /// time rather than served.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChecksumMismatch`] if the stored record no longer
    /// verifies. A missing index is `Ok(None)`, not an error.
    pub fn get(&self, idx: u64) -> Result<Option<(String, Bytes)>, Error> {
        let inner = self.inner.read().expect("wal lock poisoned");

        let record = match inner.index.get(&idx).or_else(|| inner.tmp_index.get(&idx)) {
            Some(record) => record,
            None => return Ok(None),
        };
        record.verify()?;

        Ok(Some((record.key.clone(), record.value.clone())))
    }

    /// Iterate all records in ascending index order.
    ///
    /// The iterator is snapshot-consistent: both index maps are copied under
    /// a briefly-held read lock, then sorted and yielded with no lock held,
    /// so a concurrent writer never interleaves new records into an ongoing
    /// iteration.
    pub fn iter(&self) -> Iter {
        let mut records: Vec<Record> = {
            let inner = self.inner.read().expect("wal lock poisoned");
            inner
                .index
                .values()
                .chain(inner.tmp_index.values())
                .cloned()
                .collect()
        };
        records.sort_unstable_by_key(|record| record.idx);

        Iter {
            records: records.into_iter(),
        }
    }

    /// Highest record index observed since open.
    ///
    /// Lock-free; safe to call from hot paths while a writer holds the
    /// exclusive lock.
    pub fn current_index(&self) -> u64 {
        self.last_index.load(Ordering::Relaxed)
    }

    /// Close the log, syncing the active segment file.
    ///
    /// Consumes the instance; all in-memory state is dropped. The same
    /// directory can then be re-opened with the same configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the final sync fails.
    pub fn close(self) -> Result<(), Error> {
        let inner = self.inner.into_inner().expect("wal lock poisoned");
        inner.log.sync_all()?;
        Ok(())
    }
}

impl WalInner {
    /// Encode and append one record to the active segment.
    fn append_record(&mut self, record: &Record) -> Result<(), Error> {
        let encoded = codec::encode_record(record);
        self.log.write_all(&encoded)?;
        if self.config.sync_mode {
            self.log.sync_all()?;
        }
        self.last_offset += encoded.len() as u64;
        Ok(())
    }

    /// Rotate when the active segment has reached the record threshold.
    fn rotate_if_needed(&mut self) -> Result<(), Error> {
        if self.tmp_index.len() < self.config.segments_threshold {
            return Ok(());
        }
        self.rotate()
    }

    /// Close the active segment and open a fresh one, evicting the oldest
    /// segment first when the retention cap is reached.
    ///
    /// Eviction runs before the merge so the removal is computed against a
    /// state holding only fully-persisted data; the just-rotated records
    /// enter `index` afterwards.
    fn rotate(&mut self) -> Result<(), Error> {
        if self.segments_number >= self.config.max_segments {
            self.evict_oldest()?;
        }

        let drained: Vec<(u64, Record)> = self.tmp_index.drain().collect();
        self.index.extend(drained);

        let path = segment::segment_path(&self.config.dir, &self.config.prefix, self.segments_number);
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        tracing::debug!(segment = %path.display(), "rotated to new segment");

        // Replacing the handle closes the previous active segment.
        self.log = file;
        self.segments_number += 1;
        self.last_offset = 0;

        Ok(())
    }

    /// Unlink the oldest live segment and drop its records from the index.
    fn evict_oldest(&mut self) -> Result<(), Error> {
        let oldest = self.segments_number - self.config.max_segments;
        let path = segment::segment_path(&self.config.dir, &self.config.prefix, oldest);

        // A failure to read the oldest segment fails the whole rotation; the
        // triggering write is not accepted.
        let evicted = segment::read_segment_records(&path)?;
        for record in &evicted {
            self.index.remove(&record.idx);
        }
        std::fs::remove_file(&path)?;

        tracing::debug!(
            segment = %path.display(),
            records = evicted.len(),
            "evicted oldest segment"
        );

        Ok(())
    }
}

/// Snapshot iterator over log records in ascending index order.
///
/// Returned by [`Wal::iter`]; yields owned records and holds no lock.
pub struct Iter {
    records: std::vec::IntoIter<Record>,
}

impl Iterator for Iter {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl ExactSizeIterator for Iter {}
