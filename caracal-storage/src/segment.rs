use bytes::Bytes;
use caracal_core::{BrokerError, Offset, Record, Result};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::flush::FlushConfig;
use crate::index::SparseIndex;
use crate::store::Store;

/// Configuration shared by every segment of a log.
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    pub max_size: u64,
    pub sparse_interval: u64,
    pub flush: FlushConfig,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_size: 1024 * 1024 * 1024,
            sparse_interval: crate::index::DEFAULT_SPARSE_INTERVAL,
            flush: FlushConfig::default(),
        }
    }
}

/// File name for a segment file: the start offset, zero-padded to 20
/// decimal digits.
pub fn segment_file_name(start_offset: u64, extension: &str) -> String {
    format!("{start_offset:020}.{extension}")
}

/// One store file plus its sparse index, covering the offset range
/// `[start_offset, next_offset)`.
///
/// The segment assigns offsets sequentially and keeps store and index in
/// step: every append writes the frame, then offers the entry to the
/// index (which may drop it under the sparse rule).
pub struct Segment {
    start_offset: u64,
    store: Store,
    index: SparseIndex,
    next_offset: AtomicU64,
    max_size: u64,
    append_lock: Mutex<()>,
}

impl Segment {
    /// Create or open the segment's `.log` and `.index` files in `dir`.
    ///
    /// `next_offset` is recomputed by scanning the store forward from the
    /// highest indexed entry to the end of file. A torn or corrupt
    /// trailing frame found by that scan truncates the store (and the
    /// index is trimmed to match); recovery never surfaces as an error.
    pub fn open(dir: &Path, start_offset: u64, config: &SegmentConfig) -> Result<Self> {
        let store = Store::open(
            dir.join(segment_file_name(start_offset, "log")),
            config.flush.clone(),
        )?;
        let index = SparseIndex::open(
            dir.join(segment_file_name(start_offset, "index")),
            config.sparse_interval,
        )?;

        // Rows pointing past the store can only come from a crash between
        // index and store writes; drop them before trusting the index.
        index.truncate_to(store.size(), u64::MAX)?;

        let (mut offset, mut position) = match index.find_closest(u64::MAX) {
            Some(entry) => (entry.offset + 1, entry.next_position()),
            None => (start_offset, 0),
        };

        loop {
            match store.read(position, Offset::new(offset)) {
                Ok(Some(record)) => {
                    position += record.frame_size();
                    offset += 1;
                }
                Ok(None) => break,
                Err(BrokerError::Corrupt(reason)) => {
                    warn!(
                        segment = start_offset,
                        position,
                        reason = %reason,
                        "truncating torn segment tail"
                    );
                    store.truncate(position)?;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        index.truncate_to(store.size(), offset)?;
        debug!(
            segment = start_offset,
            next_offset = offset,
            size = store.size(),
            "opened segment"
        );

        Ok(Self {
            start_offset,
            store,
            index,
            next_offset: AtomicU64::new(offset),
            max_size: config.max_size,
            append_lock: Mutex::new(()),
        })
    }

    /// Append a payload at the next sequential offset.
    pub fn append(&self, data: Bytes) -> Result<Record> {
        let _guard = self.append_lock.lock();
        let offset = self.next_offset.load(Ordering::Acquire);
        self.write_record(offset, data)
    }

    /// Append a payload at a caller-chosen offset; `next_offset` becomes
    /// `max(next_offset, offset + 1)`.
    pub fn append_at(&self, offset: u64, data: Bytes) -> Result<Record> {
        let _guard = self.append_lock.lock();
        self.write_record(offset, data)
    }

    fn write_record(&self, offset: u64, data: Bytes) -> Result<Record> {
        if self.is_full() {
            return Err(BrokerError::Full);
        }

        let record = Record::new(Offset::new(offset), data);
        let position = self.store.append(&record)?;
        self.index.maybe_add(
            offset,
            position,
            record.data.len() as u32,
            record.checksum,
        )?;

        let next = self.next_offset.load(Ordering::Acquire).max(offset + 1);
        self.next_offset.store(next, Ordering::Release);
        Ok(record)
    }

    /// Read the record at `target`, or `None` when the segment does not
    /// contain it.
    pub fn read(&self, target: u64) -> Result<Option<Record>> {
        match self.locate(target)? {
            Some(position) => self.store.read(position, Offset::new(target)),
            None => Ok(None),
        }
    }

    /// Read just the payload at `target`.
    pub fn read_raw(&self, target: u64) -> Result<Option<Bytes>> {
        match self.locate(target)? {
            Some(position) => self.store.read_raw(position),
            None => Ok(None),
        }
    }

    /// Sparse lookup plus scan-forward: start from the greatest indexed
    /// entry at most `target` (or the segment start) and walk frames
    /// until the target offset. Read-only; every scanned frame is
    /// checksum-verified by the store.
    fn locate(&self, target: u64) -> Result<Option<u64>> {
        if target < self.start_offset || target >= self.next_offset.load(Ordering::Acquire) {
            return Ok(None);
        }

        let (mut offset, mut position) = match self.index.find_closest(target) {
            Some(entry) if entry.offset == target => return Ok(Some(entry.position)),
            Some(entry) => (entry.offset + 1, entry.next_position()),
            None => (self.start_offset, 0),
        };

        while offset <= target {
            match self.store.read(position, Offset::new(offset))? {
                Some(record) => {
                    if offset == target {
                        return Ok(Some(position));
                    }
                    position += record.frame_size();
                    offset += 1;
                }
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    /// A segment is full once its store reached `max_size`; one record
    /// may straddle the limit, so `size() ≤ max_size + max message size`.
    pub fn is_full(&self) -> bool {
        self.store.size() >= self.max_size
    }

    pub fn size(&self) -> u64 {
        self.store.size()
    }

    /// Number of indexed entries, not total records.
    pub fn record_count(&self) -> usize {
        self.index.entry_count()
    }

    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// One past the highest offset written to this segment.
    pub fn next_offset(&self) -> u64 {
        self.next_offset.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn last_modified(&self) -> Result<SystemTime> {
        self.store.last_modified()
    }

    pub fn flush(&self) -> Result<()> {
        self.store.force()
    }

    pub fn close(&self) -> Result<()> {
        self.store.close()?;
        self.index.close()
    }

    /// Close the segment and delete both of its files.
    pub fn remove(&self) -> Result<()> {
        self.close()?;
        std::fs::remove_file(self.store.path())?;
        std::fs::remove_file(self.index.path())?;
        Ok(())
    }
}
