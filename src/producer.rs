use bytes::Bytes;
use caracal_core::{Record, Result};
use caracal_storage::TopicRegistry;
use std::sync::Arc;
use tracing::debug;

use crate::metrics::Metrics;

/// Publishing facade over the storage engine.
///
/// The registry is the single source of truth for topic lookup; the
/// producer holds no topic cache of its own.
pub struct Producer {
    registry: Arc<TopicRegistry>,
    metrics: Arc<Metrics>,
}

impl Producer {
    pub fn new(registry: Arc<TopicRegistry>, metrics: Arc<Metrics>) -> Self {
        Self { registry, metrics }
    }

    /// Append a payload to the topic, opening its log on first use.
    pub fn publish(&self, topic: &str, data: Bytes) -> Result<Record> {
        let log = self.registry.get_or_create(topic)?;
        let record = log.append(data)?;
        self.metrics.incr_producer_messages();
        debug!(topic, offset = %record.offset, "published message");
        Ok(record)
    }
}
