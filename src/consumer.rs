use caracal_core::{BrokerError, Record, Result};
use caracal_storage::TopicRegistry;
use std::sync::Arc;
use tracing::debug;

use crate::metrics::Metrics;

/// Reading facade over the storage engine. A topic's log opens on first
/// consume just as on first publish; an offset at or past the log's end
/// is `NotFound`.
pub struct Consumer {
    registry: Arc<TopicRegistry>,
    metrics: Arc<Metrics>,
}

impl Consumer {
    pub fn new(registry: Arc<TopicRegistry>, metrics: Arc<Metrics>) -> Self {
        Self { registry, metrics }
    }

    pub fn consume(&self, topic: &str, offset: u64) -> Result<Record> {
        let log = self.registry.get_or_create(topic)?;
        match log.read(offset)? {
            Some(record) => {
                self.metrics.incr_consumer_messages();
                debug!(topic, offset, "consumed message");
                Ok(record)
            }
            None => Err(BrokerError::NotFound(format!(
                "offset {offset} in topic '{topic}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::Producer;
    use bytes::Bytes;
    use caracal_storage::{FlushConfig, LogConfig};
    use tempfile::TempDir;

    fn pair(dir: &TempDir) -> (Producer, Consumer) {
        let config = LogConfig {
            flush: FlushConfig::immediate(),
            ..LogConfig::default()
        };
        let registry = Arc::new(TopicRegistry::new(dir.path(), config).unwrap());
        let metrics = Arc::new(Metrics::default());
        (
            Producer::new(registry.clone(), metrics.clone()),
            Consumer::new(registry, metrics),
        )
    }

    #[test]
    fn test_round_trip_small() {
        let dir = TempDir::new().unwrap();
        let (producer, consumer) = pair(&dir);

        let record = producer.publish("t", Bytes::from_static(b"hello")).unwrap();
        assert_eq!(record.offset.as_u64(), 0);

        let read = consumer.consume("t", 0).unwrap();
        assert_eq!(read.data, Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_every_published_offset_is_readable() {
        let dir = TempDir::new().unwrap();
        let (producer, consumer) = pair(&dir);

        for i in 0..50u64 {
            producer.publish("s", Bytes::from(format!("m{i}"))).unwrap();
        }
        for i in 0..50u64 {
            assert_eq!(
                consumer.consume("s", i).unwrap().data,
                Bytes::from(format!("m{i}"))
            );
        }
    }

    #[test]
    fn test_offset_past_end_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (producer, consumer) = pair(&dir);
        producer.publish("t", Bytes::from_static(b"only")).unwrap();

        assert!(matches!(
            consumer.consume("t", 1),
            Err(BrokerError::NotFound(_))
        ));
        assert!(matches!(
            consumer.consume("empty-topic", 0),
            Err(BrokerError::NotFound(_))
        ));
    }
}
