use caracal_core::{BrokerError, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// When a store forces buffered writes out of the OS page cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushStrategy {
    /// Flush after every append.
    Immediate,
    /// Flush every `message_interval` appends.
    MessageBased,
    /// Flush once `time_interval` has elapsed since the last flush.
    TimeBased,
    /// Flush on whichever of message count or elapsed time triggers first.
    Hybrid,
    /// Never explicitly flush; rely on the OS until close or force.
    OsControlled,
}

/// Durability configuration for a store. Fixed per store.
///
/// Dimensions a strategy does not use stay `None` and are ignored.
#[derive(Debug, Clone)]
pub struct FlushConfig {
    pub strategy: FlushStrategy,
    pub message_interval: Option<u64>,
    pub time_interval: Option<Duration>,
    /// `sync_all` instead of `sync_data` when flushing.
    pub force_metadata: bool,
    /// Buffered appends and the mmap read fast path. When off, every
    /// append is followed by an fsync and reads go through `read_at`.
    pub enable_page_cache: bool,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            strategy: FlushStrategy::OsControlled,
            message_interval: None,
            time_interval: None,
            force_metadata: false,
            enable_page_cache: true,
        }
    }
}

impl FlushConfig {
    /// Immediate durability, used by tests and recovery-sensitive paths.
    pub fn immediate() -> Self {
        Self {
            strategy: FlushStrategy::Immediate,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let needs_messages = matches!(
            self.strategy,
            FlushStrategy::MessageBased | FlushStrategy::Hybrid
        );
        let needs_time = matches!(
            self.strategy,
            FlushStrategy::TimeBased | FlushStrategy::Hybrid
        );

        if needs_messages && !self.message_interval.is_some_and(|n| n > 0) {
            return Err(BrokerError::Config(format!(
                "flush strategy {:?} requires message_interval > 0",
                self.strategy
            )));
        }
        if needs_time && !self.time_interval.is_some_and(|t| !t.is_zero()) {
            return Err(BrokerError::Config(format!(
                "flush strategy {:?} requires time_interval_ms > 0",
                self.strategy
            )));
        }
        Ok(())
    }
}

/// Per-store flush state. Lives under the store's writer lock, so the
/// append and the counter update are atomic with respect to other
/// appenders.
#[derive(Debug)]
pub struct FlushTracker {
    messages_since_flush: u64,
    last_flush: Instant,
}

impl FlushTracker {
    pub fn new() -> Self {
        Self {
            messages_since_flush: 0,
            last_flush: Instant::now(),
        }
    }

    pub fn record_append(&mut self) {
        self.messages_since_flush += 1;
    }

    pub fn mark_flushed(&mut self) {
        self.messages_since_flush = 0;
        self.last_flush = Instant::now();
    }

    pub fn should_flush(&self, config: &FlushConfig) -> bool {
        match config.strategy {
            FlushStrategy::Immediate => true,
            FlushStrategy::OsControlled => false,
            FlushStrategy::MessageBased => self.message_trigger(config),
            FlushStrategy::TimeBased => self.time_trigger(config),
            FlushStrategy::Hybrid => self.message_trigger(config) || self.time_trigger(config),
        }
    }

    fn message_trigger(&self, config: &FlushConfig) -> bool {
        config
            .message_interval
            .is_some_and(|n| self.messages_since_flush >= n)
    }

    fn time_trigger(&self, config: &FlushConfig) -> bool {
        config
            .time_interval
            .is_some_and(|t| self.last_flush.elapsed() >= t)
    }
}

impl Default for FlushTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: FlushStrategy) -> FlushConfig {
        FlushConfig {
            strategy,
            message_interval: Some(3),
            time_interval: Some(Duration::from_millis(50)),
            ..FlushConfig::default()
        }
    }

    #[test]
    fn test_immediate_always_flushes() {
        let tracker = FlushTracker::new();
        assert!(tracker.should_flush(&config(FlushStrategy::Immediate)));
    }

    #[test]
    fn test_os_controlled_never_flushes() {
        let mut tracker = FlushTracker::new();
        for _ in 0..10_000 {
            tracker.record_append();
        }
        assert!(!tracker.should_flush(&config(FlushStrategy::OsControlled)));
    }

    #[test]
    fn test_message_based_triggers_at_interval() {
        let cfg = config(FlushStrategy::MessageBased);
        let mut tracker = FlushTracker::new();
        tracker.record_append();
        tracker.record_append();
        assert!(!tracker.should_flush(&cfg));
        tracker.record_append();
        assert!(tracker.should_flush(&cfg));
        tracker.mark_flushed();
        assert!(!tracker.should_flush(&cfg));
    }

    #[test]
    fn test_time_based_triggers_after_interval() {
        let cfg = config(FlushStrategy::TimeBased);
        let mut tracker = FlushTracker::new();
        assert!(!tracker.should_flush(&cfg));
        std::thread::sleep(Duration::from_millis(60));
        assert!(tracker.should_flush(&cfg));
    }

    #[test]
    fn test_hybrid_triggers_on_either() {
        let cfg = config(FlushStrategy::Hybrid);
        let mut tracker = FlushTracker::new();
        for _ in 0..3 {
            tracker.record_append();
        }
        assert!(tracker.should_flush(&cfg));

        let mut tracker = FlushTracker::new();
        tracker.record_append();
        std::thread::sleep(Duration::from_millis(60));
        assert!(tracker.should_flush(&cfg));
    }

    #[test]
    fn test_validation_requires_used_dimensions() {
        let cfg = FlushConfig {
            strategy: FlushStrategy::MessageBased,
            message_interval: None,
            ..FlushConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = FlushConfig {
            strategy: FlushStrategy::Hybrid,
            message_interval: Some(10),
            time_interval: None,
            ..FlushConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = FlushConfig {
            strategy: FlushStrategy::OsControlled,
            message_interval: None,
            time_interval: None,
            ..FlushConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }
}
