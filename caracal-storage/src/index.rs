use caracal_core::record::frame_len;
use caracal_core::{BrokerError, Result};
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// On-disk size of one index row:
/// offset(8) | position(8) | length(4) | checksum(4), big-endian, no header.
pub const INDEX_ENTRY_SIZE: usize = 24;

/// Default gap between indexed offsets.
pub const DEFAULT_SPARSE_INTERVAL: u64 = 1000;

/// One sparse index row, mapping a record offset to the byte position of
/// its frame within the segment's store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub offset: u64,
    pub position: u64,
    pub length: u32,
    pub checksum: u32,
}

impl IndexEntry {
    fn encode(&self) -> [u8; INDEX_ENTRY_SIZE] {
        let mut buf = [0u8; INDEX_ENTRY_SIZE];
        buf[0..8].copy_from_slice(&self.offset.to_be_bytes());
        buf[8..16].copy_from_slice(&self.position.to_be_bytes());
        buf[16..20].copy_from_slice(&self.length.to_be_bytes());
        buf[20..24].copy_from_slice(&self.checksum.to_be_bytes());
        buf
    }

    fn decode(buf: &[u8; INDEX_ENTRY_SIZE]) -> Self {
        Self {
            offset: u64::from_be_bytes(buf[0..8].try_into().unwrap()),
            position: u64::from_be_bytes(buf[8..16].try_into().unwrap()),
            length: u32::from_be_bytes(buf[16..20].try_into().unwrap()),
            checksum: u32::from_be_bytes(buf[20..24].try_into().unwrap()),
        }
    }

    /// Position of the frame immediately after this entry's record.
    pub fn next_position(&self) -> u64 {
        self.position + frame_len(self.length as usize)
    }
}

/// Memory-efficient offset map: only every `sparse_interval`-th offset is
/// indexed; the rest are found by scanning forward from the nearest
/// smaller indexed entry.
///
/// Entries are kept in memory in offset order (replayed from the file on
/// open) and binary-searched; each add appends one row and fdatasyncs.
pub struct SparseIndex {
    path: PathBuf,
    file: Mutex<File>,
    entries: RwLock<Vec<IndexEntry>>,
    interval: u64,
    closed: AtomicBool,
}

impl SparseIndex {
    /// Create or open the index, replaying the file to rebuild the
    /// in-memory entries. A truncated trailing row is dropped from the
    /// file, not reported as corruption.
    pub fn open(path: impl AsRef<Path>, interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;

        let whole_rows = raw.len() / INDEX_ENTRY_SIZE;
        let mut entries = Vec::with_capacity(whole_rows);
        for row in 0..whole_rows {
            let start = row * INDEX_ENTRY_SIZE;
            let buf: [u8; INDEX_ENTRY_SIZE] =
                raw[start..start + INDEX_ENTRY_SIZE].try_into().unwrap();
            entries.push(IndexEntry::decode(&buf));
        }

        let valid_len = (whole_rows * INDEX_ENTRY_SIZE) as u64;
        if valid_len < raw.len() as u64 {
            warn!(
                path = %path.display(),
                "index file has a torn trailing row, truncating to {valid_len} bytes"
            );
            file.set_len(valid_len)?;
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
            entries: RwLock::new(entries),
            interval,
            closed: AtomicBool::new(false),
        })
    }

    /// Record an entry if the indexing rule selects this offset; silently
    /// dropped otherwise. The caller appends in strictly increasing
    /// offset order.
    ///
    /// Rule: index offset 0, every multiple of the interval, and any
    /// offset more than one interval past the last indexed one.
    pub fn maybe_add(
        &self,
        offset: u64,
        position: u64,
        length: u32,
        checksum: u32,
    ) -> Result<bool> {
        self.ensure_open()?;
        let mut entries = self.entries.write();

        let indexed = offset == 0
            || offset % self.interval == 0
            || entries
                .last()
                .is_some_and(|last| offset > last.offset + self.interval);
        if !indexed {
            return Ok(false);
        }

        let entry = IndexEntry {
            offset,
            position,
            length,
            checksum,
        };
        let file = self.file.lock();
        (&*file).write_all(&entry.encode())?;
        file.sync_data()?;
        drop(file);

        entries.push(entry);
        Ok(true)
    }

    /// The greatest indexed entry whose offset is at most `target`;
    /// `None` iff the index is empty or every entry is past `target`.
    pub fn find_closest(&self, target: u64) -> Option<IndexEntry> {
        let entries = self.entries.read();
        let idx = entries.partition_point(|e| e.offset <= target);
        if idx == 0 {
            None
        } else {
            Some(entries[idx - 1])
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn highest_offset(&self) -> Option<u64> {
        self.entries.read().last().map(|e| e.offset)
    }

    /// Drop rows referring past a recovered store: any entry whose frame
    /// does not fit inside `store_size` or whose offset is not below
    /// `next_offset`, and everything after it.
    pub(crate) fn truncate_to(&self, store_size: u64, next_offset: u64) -> Result<()> {
        let mut entries = self.entries.write();
        let valid = entries
            .iter()
            .take_while(|e| e.next_position() <= store_size && e.offset < next_offset)
            .count();
        if valid == entries.len() {
            return Ok(());
        }

        warn!(
            path = %self.path.display(),
            dropped = entries.len() - valid,
            "index refers past recovered store, truncating"
        );
        let file = self.file.lock();
        file.set_len((valid * INDEX_ENTRY_SIZE) as u64)?;
        file.sync_data()?;
        drop(file);
        entries.truncate(valid);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.file.lock().sync_data()?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed("index"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn add(index: &SparseIndex, offset: u64, position: u64) -> bool {
        index.maybe_add(offset, position, 10, 0xfeed).unwrap()
    }

    #[test]
    fn test_indexing_rule() {
        let dir = TempDir::new().unwrap();
        let index = SparseIndex::open(dir.path().join("0.index"), 100).unwrap();

        assert!(add(&index, 0, 0));
        assert!(!add(&index, 1, 26));
        assert!(!add(&index, 99, 700));
        assert!(add(&index, 100, 726));
        assert!(!add(&index, 150, 2000));
        assert!(add(&index, 200, 2600));
        // A gap larger than the interval is indexed even off the grid.
        assert!(add(&index, 301, 4000));
        assert_eq!(index.entry_count(), 4);
        assert_eq!(index.highest_offset(), Some(301));
    }

    #[test]
    fn test_find_closest_returns_greatest_entry_at_most_target() {
        let dir = TempDir::new().unwrap();
        let index = SparseIndex::open(dir.path().join("0.index"), 100).unwrap();
        add(&index, 0, 0);
        add(&index, 100, 1000);
        add(&index, 200, 2000);

        assert_eq!(index.find_closest(0).unwrap().offset, 0);
        assert_eq!(index.find_closest(99).unwrap().offset, 0);
        assert_eq!(index.find_closest(100).unwrap().offset, 100);
        assert_eq!(index.find_closest(150).unwrap().offset, 100);
        assert_eq!(index.find_closest(5000).unwrap().offset, 200);
    }

    #[test]
    fn test_find_closest_on_empty_index() {
        let dir = TempDir::new().unwrap();
        let index = SparseIndex::open(dir.path().join("0.index"), 100).unwrap();
        assert!(index.find_closest(10).is_none());
    }

    #[test]
    fn test_replay_on_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.index");

        let index = SparseIndex::open(&path, 100).unwrap();
        add(&index, 0, 0);
        add(&index, 100, 1234);
        index.close().unwrap();

        let index = SparseIndex::open(&path, 100).unwrap();
        assert_eq!(index.entry_count(), 2);
        let entry = index.find_closest(170).unwrap();
        assert_eq!(entry.offset, 100);
        assert_eq!(entry.position, 1234);
        assert_eq!(entry.length, 10);
        assert_eq!(entry.checksum, 0xfeed);
    }

    #[test]
    fn test_torn_trailing_row_is_dropped_on_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.index");

        let index = SparseIndex::open(&path, 100).unwrap();
        add(&index, 0, 0);
        index.close().unwrap();

        // Simulate a crash mid-row.
        let file = OpenOptions::new().append(true).open(&path).unwrap();
        (&file).write_all(&[0xAB; 7]).unwrap();
        drop(file);

        let index = SparseIndex::open(&path, 100).unwrap();
        assert_eq!(index.entry_count(), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), INDEX_ENTRY_SIZE as u64);
    }

    #[test]
    fn test_truncate_to_drops_rows_past_store() {
        let dir = TempDir::new().unwrap();
        let index = SparseIndex::open(dir.path().join("0.index"), 100).unwrap();
        add(&index, 0, 0);
        add(&index, 100, 2600);
        add(&index, 200, 5200);

        // Store recovered to 2626 bytes, next offset 101: the last row
        // points past the tail and goes.
        index.truncate_to(2626, 101).unwrap();
        assert_eq!(index.entry_count(), 2);
        assert_eq!(index.highest_offset(), Some(100));
    }

    #[test]
    fn test_add_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let index = SparseIndex::open(dir.path().join("0.index"), 100).unwrap();
        index.close().unwrap();
        assert!(matches!(
            index.maybe_add(0, 0, 1, 1),
            Err(BrokerError::Closed(_))
        ));
    }
}
