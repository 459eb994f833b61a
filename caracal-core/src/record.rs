use bytes::{BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{BrokerError, Result};
use crate::offset::Offset;

/// Size of the fixed frame header: length(4) + timestamp(8) + checksum(4).
pub const RECORD_HEADER_SIZE: usize = 16;

/// Total on-disk size of a frame carrying `data_len` payload bytes.
///
/// The scan-forward stride in the segment layer must agree with the frame
/// layout, so both use this function.
#[inline]
pub fn frame_len(data_len: usize) -> u64 {
    (RECORD_HEADER_SIZE + data_len) as u64
}

/// CRC32 over a payload, the integrity check used everywhere.
#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A single message
///
/// The offset is assigned by the log and is not part of the on-disk
/// frame; it is recovered from the index or from scan position.
///
/// Frame layout (big-endian):
///
/// ```text
/// [ length:4 | timestamp:8 | checksum:4 | data:length ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub offset: Offset,
    pub timestamp: u64,
    pub data: Bytes,
    pub checksum: u32,
}

impl Record {
    /// Create a record stamped with the current time and a computed checksum.
    pub fn new(offset: Offset, data: Bytes) -> Self {
        let checksum = checksum(&data);
        Self {
            offset,
            timestamp: now_millis(),
            data,
            checksum,
        }
    }

    /// Encode the frame. A zero checksum is computed from the data.
    pub fn encode(&self) -> Bytes {
        let checksum = if self.checksum == 0 {
            checksum(&self.data)
        } else {
            self.checksum
        };

        let mut buf = BytesMut::with_capacity(RECORD_HEADER_SIZE + self.data.len());
        buf.put_u32(self.data.len() as u32);
        buf.put_u64(self.timestamp);
        buf.put_u32(checksum);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    /// Decode one frame from the start of `buf`, assigning `offset`.
    ///
    /// The checksum is validated against the payload; any mismatch, short
    /// header, or declared length running past the buffer is `Corrupt`.
    pub fn decode(buf: &[u8], offset: Offset) -> Result<Record> {
        if buf.len() < RECORD_HEADER_SIZE {
            return Err(BrokerError::Corrupt(format!(
                "frame header truncated: {} of {} bytes",
                buf.len(),
                RECORD_HEADER_SIZE
            )));
        }

        let length = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        let timestamp = u64::from_be_bytes(buf[4..12].try_into().unwrap());
        let stored_checksum = u32::from_be_bytes(buf[12..16].try_into().unwrap());

        let end = RECORD_HEADER_SIZE + length;
        if buf.len() < end {
            return Err(BrokerError::Corrupt(format!(
                "frame body truncated: declared {} bytes, {} available",
                length,
                buf.len() - RECORD_HEADER_SIZE
            )));
        }

        let data = Bytes::copy_from_slice(&buf[RECORD_HEADER_SIZE..end]);
        let computed = checksum(&data);
        if computed != stored_checksum {
            return Err(BrokerError::Corrupt(format!(
                "checksum mismatch at offset {offset}: stored {stored_checksum:#010x}, computed {computed:#010x}"
            )));
        }

        Ok(Record {
            offset,
            timestamp,
            data,
            checksum: stored_checksum,
        })
    }

    /// Re-hash the payload and compare against the stored checksum.
    pub fn is_valid(&self) -> bool {
        checksum(&self.data) == self.checksum
    }

    /// On-disk size of this record's frame.
    pub fn frame_size(&self) -> u64 {
        frame_len(self.data.len())
    }
}
