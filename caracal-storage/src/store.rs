use bytes::Bytes;
use caracal_core::record::{frame_len, Record, RECORD_HEADER_SIZE};
use caracal_core::{BrokerError, Offset, Result};
use memmap2::Mmap;
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use crate::flush::{FlushConfig, FlushTracker};

/// Append-only byte container holding the framed records of one segment.
///
/// One writer at a time: `append` runs under the writer mutex, which also
/// covers the flush counters. Readers use positional reads and never take
/// that lock; with the page cache enabled they go through an mmap that is
/// refreshed on open and on flush, falling back to `read_at` for bytes
/// written since the last mapping.
pub struct Store {
    path: PathBuf,
    reader: File,
    writer: Mutex<StoreWriter>,
    size: AtomicU64,
    mmap: RwLock<Option<Mmap>>,
    config: FlushConfig,
    closed: AtomicBool,
}

struct StoreWriter {
    file: File,
    position: u64,
    tracker: FlushTracker,
}

impl Store {
    /// Create or open the store file, positioned at its end.
    pub fn open(path: impl AsRef<Path>, config: FlushConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let size = file.metadata()?.len();
        file.seek(SeekFrom::End(0))?;
        let reader = file.try_clone()?;

        let mmap = if config.enable_page_cache && size > 0 {
            Some(unsafe { Mmap::map(&reader)? })
        } else {
            None
        };

        Ok(Self {
            path,
            reader,
            writer: Mutex::new(StoreWriter {
                file,
                position: size,
                tracker: FlushTracker::new(),
            }),
            size: AtomicU64::new(size),
            mmap: RwLock::new(mmap),
            config,
            closed: AtomicBool::new(false),
        })
    }

    /// Append one record's frame; returns the position it starts at.
    pub fn append(&self, record: &Record) -> Result<u64> {
        self.ensure_open()?;
        let frame = record.encode();

        let mut writer = self.writer.lock();
        let position = writer.position;
        writer.file.write_all(&frame)?;
        writer.position += frame.len() as u64;
        self.size.store(writer.position, Ordering::Release);

        if self.config.enable_page_cache {
            writer.tracker.record_append();
            if writer.tracker.should_flush(&self.config) {
                self.flush_locked(&mut writer)?;
            }
        } else {
            // Write-through: no page cache means every append is durable.
            self.sync(&writer.file)?;
            writer.tracker.mark_flushed();
        }

        Ok(position)
    }

    /// Read the frame starting at `position`, assigning `expected_offset`.
    ///
    /// `None` at or past the end of the store. A frame that is torn (the
    /// header or declared body runs past the end) or fails its checksum
    /// is `Corrupt`; after open-time recovery neither occurs.
    pub fn read(&self, position: u64, expected_offset: Offset) -> Result<Option<Record>> {
        self.ensure_open()?;
        match self.read_frame(position)? {
            Some(frame) => Record::decode(&frame, expected_offset).map(Some),
            None => Ok(None),
        }
    }

    /// Read just the payload bytes of the frame at `position`.
    pub fn read_raw(&self, position: u64) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        match self.read_frame(position)? {
            Some(frame) => Record::decode(&frame, Offset::ZERO).map(|r| Some(r.data)),
            None => Ok(None),
        }
    }

    fn read_frame(&self, position: u64) -> Result<Option<Vec<u8>>> {
        let size = self.size.load(Ordering::Acquire);
        if position >= size {
            return Ok(None);
        }
        if position + RECORD_HEADER_SIZE as u64 > size {
            return Err(BrokerError::Corrupt(format!(
                "torn frame header at position {position} ({} bytes to end of store)",
                size - position
            )));
        }

        let mut frame = self.read_exact(position, RECORD_HEADER_SIZE)?;
        let length = u32::from_be_bytes(frame[0..4].try_into().unwrap()) as usize;
        if position + frame_len(length) > size {
            return Err(BrokerError::Corrupt(format!(
                "torn frame body at position {position}: declared {length} bytes past end of store"
            )));
        }

        let data = self.read_exact(position + RECORD_HEADER_SIZE as u64, length)?;
        frame.extend_from_slice(&data);
        Ok(Some(frame))
    }

    fn read_exact(&self, position: u64, len: usize) -> Result<Vec<u8>> {
        if let Some(mmap) = self.mmap.read().as_ref() {
            let start = position as usize;
            let end = start + len;
            if end <= mmap.len() {
                return Ok(mmap[start..end].to_vec());
            }
        }
        let mut buf = vec![0u8; len];
        self.reader.read_exact_at(&mut buf, position)?;
        Ok(buf)
    }

    /// Synchronous flush and fsync.
    pub fn force(&self) -> Result<()> {
        self.ensure_open()?;
        let mut writer = self.writer.lock();
        self.flush_locked(&mut writer)
    }

    /// Flush, then release. Operations after close fail with `Closed`.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        self.sync(&writer.file)?;
        writer.tracker.mark_flushed();
        Ok(())
    }

    /// Drop all bytes at and after `new_len`. Open-time recovery only.
    pub(crate) fn truncate(&self, new_len: u64) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.file.set_len(new_len)?;
        writer.file.seek(SeekFrom::Start(new_len))?;
        writer.position = new_len;
        self.size.store(new_len, Ordering::Release);
        self.remap()
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Position the next frame would be appended at.
    pub fn current_position(&self) -> u64 {
        self.size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last-modified time of the store file, the retention basis.
    pub fn last_modified(&self) -> Result<SystemTime> {
        Ok(self.reader.metadata()?.modified()?)
    }

    fn flush_locked(&self, writer: &mut StoreWriter) -> Result<()> {
        self.sync(&writer.file)?;
        writer.tracker.mark_flushed();
        self.remap()
    }

    fn sync(&self, file: &File) -> Result<()> {
        if self.config.force_metadata {
            file.sync_all()?;
        } else {
            file.sync_data()?;
        }
        Ok(())
    }

    fn remap(&self) -> Result<()> {
        if !self.config.enable_page_cache {
            return Ok(());
        }
        let size = self.size.load(Ordering::Acquire);
        let mut mmap = self.mmap.write();
        *mmap = if size > 0 {
            Some(unsafe { Mmap::map(&self.reader)? })
        } else {
            None
        };
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed("store"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(offset: u64, data: &'static [u8]) -> Record {
        Record::new(Offset::new(offset), Bytes::from_static(data))
    }

    #[test]
    fn test_append_and_read() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("0.log"), FlushConfig::immediate()).unwrap();

        let first = record(0, b"hello");
        let second = record(1, b"world!");
        let p0 = store.append(&first).unwrap();
        let p1 = store.append(&second).unwrap();

        assert_eq!(p0, 0);
        assert_eq!(p1, first.frame_size());
        assert_eq!(store.size(), first.frame_size() + second.frame_size());

        let read = store.read(p1, Offset::new(1)).unwrap().unwrap();
        assert_eq!(read.data, second.data);
        assert_eq!(read.offset, Offset::new(1));
    }

    #[test]
    fn test_read_past_end_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("0.log"), FlushConfig::default()).unwrap();
        assert!(store.read(0, Offset::ZERO).unwrap().is_none());

        store.append(&record(0, b"x")).unwrap();
        assert!(store.read(store.size(), Offset::new(1)).unwrap().is_none());
    }

    #[test]
    fn test_read_raw_returns_payload_only() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("0.log"), FlushConfig::default()).unwrap();
        let pos = store.append(&record(0, b"payload")).unwrap();
        assert_eq!(store.read_raw(pos).unwrap().unwrap().as_ref(), b"payload");
    }

    #[test]
    fn test_contents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.log");

        let store = Store::open(&path, FlushConfig::immediate()).unwrap();
        let pos = store.append(&record(0, b"durable")).unwrap();
        store.close().unwrap();

        let store = Store::open(&path, FlushConfig::immediate()).unwrap();
        assert!(!store.is_empty());
        let read = store.read(pos, Offset::ZERO).unwrap().unwrap();
        assert_eq!(read.data.as_ref(), b"durable");
    }

    #[test]
    fn test_write_through_without_page_cache() {
        let dir = TempDir::new().unwrap();
        let config = FlushConfig {
            enable_page_cache: false,
            ..FlushConfig::default()
        };
        let store = Store::open(dir.path().join("0.log"), config).unwrap();
        let pos = store.append(&record(0, b"direct")).unwrap();
        let read = store.read(pos, Offset::ZERO).unwrap().unwrap();
        assert_eq!(read.data.as_ref(), b"direct");
    }

    #[test]
    fn test_mmap_fast_path_sees_flushed_data() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("0.log"), FlushConfig::default()).unwrap();
        let pos = store.append(&record(0, b"mapped")).unwrap();
        store.force().unwrap();
        let read = store.read(pos, Offset::ZERO).unwrap().unwrap();
        assert_eq!(read.data.as_ref(), b"mapped");
    }

    #[test]
    fn test_operations_after_close_fail() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("0.log"), FlushConfig::default()).unwrap();
        store.close().unwrap();

        assert!(matches!(
            store.append(&record(0, b"late")),
            Err(BrokerError::Closed(_))
        ));
        assert!(matches!(
            store.read(0, Offset::ZERO),
            Err(BrokerError::Closed(_))
        ));
    }

    #[test]
    fn test_truncate_discards_tail() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("0.log"), FlushConfig::default()).unwrap();
        let first = record(0, b"keep");
        store.append(&first).unwrap();
        store.append(&record(1, b"drop")).unwrap();

        store.truncate(first.frame_size()).unwrap();
        assert_eq!(store.size(), first.frame_size());
        assert!(store.read(first.frame_size(), Offset::new(1)).unwrap().is_none());

        let pos = store.append(&record(1, b"again")).unwrap();
        assert_eq!(pos, first.frame_size());
    }
}
