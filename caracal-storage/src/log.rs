use bytes::Bytes;
use caracal_core::{BrokerError, Record, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::flush::FlushConfig;
use crate::segment::{Segment, SegmentConfig};

/// Storage configuration for one topic's log.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub max_segment_size: u64,
    pub max_message_size: u64,
    /// Segments older than this are deleted by the retention sweep.
    /// Zero disables retention.
    pub retention: Duration,
    pub sparse_interval: u64,
    pub flush: FlushConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_segment_size: 1024 * 1024 * 1024,
            max_message_size: 1024 * 1024,
            retention: Duration::from_secs(7 * 24 * 3600),
            sparse_interval: crate::index::DEFAULT_SPARSE_INTERVAL,
            flush: FlushConfig::default(),
        }
    }
}

impl LogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_segment_size == 0 {
            return Err(BrokerError::Config(
                "max_segment_size must be > 0".to_string(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(BrokerError::Config(
                "max_message_size must be > 0".to_string(),
            ));
        }
        if self.sparse_interval == 0 {
            return Err(BrokerError::Config(
                "sparse_interval must be > 0".to_string(),
            ));
        }
        self.flush.validate()
    }

    fn segment_config(&self) -> SegmentConfig {
        SegmentConfig {
            max_size: self.max_segment_size,
            sparse_interval: self.sparse_interval,
            flush: self.flush.clone(),
        }
    }
}

/// One topic's ordered collection of segments.
///
/// The last segment is the active one and the only one receiving
/// appends. The segment list is guarded by a reader-writer lock held
/// only for list inspection and mutation (rotation, retention), never
/// across record I/O.
pub struct Log {
    dir: PathBuf,
    config: LogConfig,
    segments: RwLock<Vec<Arc<Segment>>>,
}

impl Log {
    /// Open the log in `dir`, creating the directory and segment 0 when
    /// nothing exists yet. Existing segments are enumerated from their
    /// `.log` files, sorted by start offset, and opened in order; each
    /// open runs the segment's tail recovery.
    pub fn open(dir: impl AsRef<Path>, config: LogConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let mut start_offsets = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            match stem.parse::<u64>() {
                Ok(offset) => start_offsets.push(offset),
                Err(_) => {
                    warn!(path = %path.display(), "skipping file with non-numeric segment name")
                }
            }
        }
        start_offsets.sort_unstable();

        let mut segments = Vec::with_capacity(start_offsets.len().max(1));
        for start_offset in start_offsets {
            segments.push(Arc::new(Segment::open(
                &dir,
                start_offset,
                &config.segment_config(),
            )?));
        }
        if segments.is_empty() {
            segments.push(Arc::new(Segment::open(&dir, 0, &config.segment_config())?));
        }

        info!(
            dir = %dir.display(),
            segments = segments.len(),
            next_offset = segments.last().map(|s| s.next_offset()).unwrap_or(0),
            "opened log"
        );

        Ok(Self {
            dir,
            config,
            segments: RwLock::new(segments),
        })
    }

    /// Append a payload at the next offset, rotating to a fresh segment
    /// when the active one is full. `Full` from the segment never
    /// escapes; it triggers the rotation and a retry.
    pub fn append(&self, data: Bytes) -> Result<Record> {
        self.check_message_size(&data)?;
        loop {
            let active = self.active()?;
            if !active.is_full() {
                match active.append(data.clone()) {
                    Err(BrokerError::Full) => {}
                    result => return result,
                }
            }
            self.rotate(active.start_offset())?;
        }
    }

    /// Append with a caller-chosen offset, which must be at least
    /// `next_offset`. Used for replay and externally numbered appends.
    pub fn append_at(&self, offset: u64, data: Bytes) -> Result<Record> {
        self.check_message_size(&data)?;
        let next = self.next_offset();
        if offset < next {
            return Err(BrokerError::InvalidArgument(format!(
                "offset {offset} is below the log's next offset {next}"
            )));
        }
        loop {
            let active = self.active()?;
            if !active.is_full() {
                match active.append_at(offset, data.clone()) {
                    Err(BrokerError::Full) => {}
                    result => return result,
                }
            }
            self.rotate(active.start_offset())?;
        }
    }

    /// Read the record at `target`, routing to the owning segment by
    /// binary search over start offsets. `None` past the end of the log
    /// or before its first retained segment.
    pub fn read(&self, target: u64) -> Result<Option<Record>> {
        let segment = {
            let segments = self.segments.read();
            let idx = segments.partition_point(|s| s.start_offset() <= target);
            if idx == 0 {
                return Ok(None);
            }
            segments[idx - 1].clone()
        };
        segment.read(target)
    }

    /// Read just the payload at `target`.
    pub fn read_raw(&self, target: u64) -> Result<Option<Bytes>> {
        let segment = {
            let segments = self.segments.read();
            let idx = segments.partition_point(|s| s.start_offset() <= target);
            if idx == 0 {
                return Ok(None);
            }
            segments[idx - 1].clone()
        };
        segment.read_raw(target)
    }

    /// One past the highest offset in the log.
    pub fn next_offset(&self) -> u64 {
        self.segments
            .read()
            .last()
            .map(|s| s.next_offset())
            .unwrap_or(0)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Sum of indexed entries across segments (sparse, not total records).
    pub fn record_count(&self) -> usize {
        self.segments.read().iter().map(|s| s.record_count()).sum()
    }

    /// Flush the active segment; older segments are read-only and were
    /// flushed at rotation.
    pub fn flush(&self) -> Result<()> {
        self.active()?.flush()
    }

    pub fn close(&self) -> Result<()> {
        let segments = self.segments.write();
        for segment in segments.iter() {
            segment.close()?;
        }
        Ok(())
    }

    /// Close every segment and delete the log directory.
    pub fn remove(&self) -> Result<()> {
        self.close()?;
        std::fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    /// Delete non-active segments whose files' last-modified time is
    /// older than the retention window. Failures are logged, never
    /// propagated; the active segment is never deleted.
    pub fn enforce_retention(&self) {
        let retention = self.config.retention;
        if retention.is_zero() {
            return;
        }

        let mut removed = 0usize;
        let mut segments = self.segments.write();
        while segments.len() > 1 {
            let expired = match segments[0].last_modified() {
                Ok(modified) => modified
                    .elapsed()
                    .map(|age| age > retention)
                    .unwrap_or(false),
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "cannot stat oldest segment");
                    false
                }
            };
            if !expired {
                break;
            }

            let segment = segments.remove(0);
            debug!(
                dir = %self.dir.display(),
                start_offset = segment.start_offset(),
                "removing expired segment"
            );
            if let Err(e) = segment.remove() {
                warn!(
                    dir = %self.dir.display(),
                    start_offset = segment.start_offset(),
                    error = %e,
                    "failed to remove expired segment"
                );
            }
            removed += 1;
        }

        if removed > 0 {
            info!(dir = %self.dir.display(), removed, "retention removed expired segments");
        }
    }

    fn active(&self) -> Result<Arc<Segment>> {
        self.segments
            .read()
            .last()
            .cloned()
            .ok_or(BrokerError::Closed("log"))
    }

    /// Rotate if the segment the caller observed is still the active one
    /// and still full; a raced rotation by another appender is a no-op.
    fn rotate(&self, observed_start: u64) -> Result<()> {
        let mut segments = self.segments.write();
        let active = segments.last().cloned().ok_or(BrokerError::Closed("log"))?;
        if active.start_offset() != observed_start || !active.is_full() {
            return Ok(());
        }

        let start_offset = active.next_offset();
        active.flush()?;
        let segment = Segment::open(&self.dir, start_offset, &self.config.segment_config())?;
        info!(dir = %self.dir.display(), start_offset, "rotated to new segment");
        segments.push(Arc::new(segment));
        Ok(())
    }

    fn check_message_size(&self, data: &Bytes) -> Result<()> {
        if data.len() as u64 > self.config.max_message_size {
            return Err(BrokerError::InvalidArgument(format!(
                "message of {} bytes exceeds max_message_size {}",
                data.len(),
                self.config.max_message_size
            )));
        }
        Ok(())
    }
}
