use caracal_protocol::api::MetricsResponse;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide broker counters, served by `GET /metrics`.
#[derive(Debug, Default)]
pub struct Metrics {
    producer_messages: AtomicU64,
    consumer_messages: AtomicU64,
    processed_requests: AtomicU64,
    error_count: AtomicU64,
}

impl Metrics {
    pub fn incr_producer_messages(&self) {
        self.producer_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_consumer_messages(&self) {
        self.consumer_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_processed_requests(&self) {
        self.processed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_error_count(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsResponse {
        MetricsResponse {
            producer_messages: self.producer_messages.load(Ordering::Relaxed),
            consumer_messages: self.consumer_messages.load(Ordering::Relaxed),
            processed_requests: self.processed_requests.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::default();
        metrics.incr_producer_messages();
        metrics.incr_producer_messages();
        metrics.incr_consumer_messages();
        metrics.incr_processed_requests();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.producer_messages, 2);
        assert_eq!(snapshot.consumer_messages, 1);
        assert_eq!(snapshot.processed_requests, 1);
        assert_eq!(snapshot.error_count, 0);
    }
}
