//! Caracal Storage - The log storage engine
//!
//! Append-only, segment-based persistence for topics:
//! - Fixed-frame record store with CRC32 integrity checking
//! - Configurable flush policy with an OS page-cache fast path
//! - Sparse offset index (binary search + bounded scan-forward)
//! - Segment rotation, crash recovery, and time-based retention

pub mod flush;
pub mod index;
pub mod log;
pub mod registry;
pub mod segment;
pub mod store;

pub use flush::{FlushConfig, FlushStrategy};
pub use index::{IndexEntry, SparseIndex, DEFAULT_SPARSE_INTERVAL};
pub use log::{Log, LogConfig};
pub use registry::TopicRegistry;
pub use segment::{Segment, SegmentConfig};
pub use store::Store;
