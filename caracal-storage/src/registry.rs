use caracal_core::{validate_topic_name, BrokerError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::log::{Log, LogConfig};

/// Process-wide map of topic name to its log.
///
/// Creation is compute-if-absent under one lock: two concurrent callers
/// asking for the same topic observe the same `Log` instance.
pub struct TopicRegistry {
    data_dir: PathBuf,
    config: LogConfig,
    topics: RwLock<HashMap<String, Arc<Log>>>,
}

impl TopicRegistry {
    pub fn new(data_dir: impl Into<PathBuf>, config: LogConfig) -> Result<Self> {
        config.validate()?;
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            config,
            topics: RwLock::new(HashMap::new()),
        })
    }

    /// The log for `name`, opened (and its directory created) on first
    /// use.
    pub fn get_or_create(&self, name: &str) -> Result<Arc<Log>> {
        validate_topic_name(name)?;

        if let Some(log) = self.topics.read().get(name) {
            return Ok(log.clone());
        }

        let mut topics = self.topics.write();
        // Re-check: another caller may have won the race for the lock.
        if let Some(log) = topics.get(name) {
            return Ok(log.clone());
        }

        let log = Arc::new(Log::open(self.data_dir.join(name), self.config.clone())?);
        info!(topic = name, "opened topic log");
        topics.insert(name.to_string(), log.clone());
        Ok(log)
    }

    /// Create a topic, failing with `AlreadyExists` when it is present.
    pub fn create(&self, name: &str) -> Result<Arc<Log>> {
        validate_topic_name(name)?;

        let mut topics = self.topics.write();
        if topics.contains_key(name) || self.data_dir.join(name).exists() {
            return Err(BrokerError::AlreadyExists(format!("topic '{name}'")));
        }

        let log = Arc::new(Log::open(self.data_dir.join(name), self.config.clone())?);
        info!(topic = name, "created topic");
        topics.insert(name.to_string(), log.clone());
        Ok(log)
    }

    /// Topic names in sorted order: every open topic plus topics left on
    /// disk by an earlier run that have not been touched yet.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.read().keys().cloned().collect();

        if let Ok(entries) = std::fs::read_dir(&self.data_dir) {
            for entry in entries.flatten() {
                if !entry.path().is_dir() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    if validate_topic_name(name).is_ok() && !names.iter().any(|n| n == name) {
                        names.push(name.to_string());
                    }
                }
            }
        }

        names.sort_unstable();
        names
    }

    /// Close the topic's log and delete its files. A later access
    /// recreates a fresh empty log in the same directory.
    pub fn delete(&self, name: &str) -> Result<()> {
        validate_topic_name(name)?;

        let removed = self.topics.write().remove(name);
        match removed {
            Some(log) => log.remove()?,
            None => {
                // Left behind by an earlier run, never opened here.
                let dir = self.data_dir.join(name);
                if !dir.exists() {
                    return Err(BrokerError::NotFound(format!("topic '{name}'")));
                }
                std::fs::remove_dir_all(dir)?;
            }
        }
        info!(topic = name, "deleted topic");
        Ok(())
    }

    /// Run the retention sweep over every open log.
    pub fn enforce_retention(&self) {
        let logs: Vec<Arc<Log>> = self.topics.read().values().cloned().collect();
        for log in logs {
            log.enforce_retention();
        }
    }

    /// Flush and close every log; part of shutdown.
    pub fn close(&self) {
        let mut topics = self.topics.write();
        for (name, log) in topics.drain() {
            if let Err(e) = log.flush().and_then(|_| log.close()) {
                warn!(topic = %name, error = %e, "failed to close topic log");
            }
        }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }
}
