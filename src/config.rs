use caracal_core::{BrokerError, Result};
use caracal_storage::{FlushConfig, FlushStrategy, LogConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Top-level broker configuration, decoded from `config/<env>.json`.
///
/// Every field has a default so partial files work; the `dev`
/// environment runs entirely on defaults when no file exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub data_directory: PathBuf,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub flush: FlushSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Orchestrator workers draining the request channel.
    pub thread_pool_size: usize,
    /// Workers completing responses from the response channel.
    pub response_pool_size: usize,
    /// Capacity of the request and response channels.
    pub request_queue_size: usize,
    /// How long a submission may wait for queue space before 503.
    pub submit_timeout_ms: u64,
    /// Deadline a processor honors before starting I/O.
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub max_segment_size: u64,
    pub retention_ms: u64,
    pub retention_check_ms: u64,
    pub max_message_size: u64,
    pub sparse_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushSettings {
    pub strategy: FlushStrategy,
    pub message_interval: Option<u64>,
    pub time_interval_ms: Option<u64>,
    pub force_metadata: bool,
    pub enable_page_cache: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("./data"),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            flush: FlushSettings::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8844,
            thread_pool_size: 4,
            response_pool_size: 2,
            request_queue_size: 1000,
            submit_timeout_ms: 1000,
            request_timeout_ms: 30_000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_segment_size: 1024 * 1024 * 1024,
            retention_ms: 7 * 24 * 3600 * 1000,
            retention_check_ms: 60_000,
            max_message_size: 1024 * 1024,
            sparse_interval: 1000,
        }
    }
}

impl Default for FlushSettings {
    fn default() -> Self {
        Self {
            strategy: FlushStrategy::OsControlled,
            message_interval: None,
            time_interval_ms: None,
            force_metadata: false,
            enable_page_cache: true,
        }
    }
}

impl BrokerConfig {
    /// Load the configuration for a named environment from
    /// `<config dir>/<environment>.json`. The config dir defaults to
    /// `config` and can be overridden with `CARACAL_CONFIG_DIR`. A
    /// missing file is a startup failure except for `dev`, which falls
    /// back to defaults.
    pub fn load(environment: &str) -> Result<Self> {
        let dir =
            std::env::var("CARACAL_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
        let path = Path::new(&dir).join(format!("{environment}.json"));

        let config = if path.exists() {
            Self::from_file(&path)?
        } else if environment == "dev" {
            info!(path = %path.display(), "no configuration file, using defaults");
            Self::default()
        } else {
            return Err(BrokerError::Config(format!(
                "configuration file {} not found",
                path.display()
            )));
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| BrokerError::Config(format!("parsing {}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.thread_pool_size == 0 {
            return Err(BrokerError::Config(
                "server.thread_pool_size must be > 0".to_string(),
            ));
        }
        if self.server.response_pool_size == 0 {
            return Err(BrokerError::Config(
                "server.response_pool_size must be > 0".to_string(),
            ));
        }
        if self.server.request_queue_size == 0 {
            return Err(BrokerError::Config(
                "server.request_queue_size must be > 0".to_string(),
            ));
        }
        if self.storage.retention_check_ms == 0 {
            return Err(BrokerError::Config(
                "storage.retention_check_ms must be > 0".to_string(),
            ));
        }
        self.log_config().validate()
    }

    pub fn flush_config(&self) -> FlushConfig {
        FlushConfig {
            strategy: self.flush.strategy,
            message_interval: self.flush.message_interval,
            time_interval: self.flush.time_interval_ms.map(Duration::from_millis),
            force_metadata: self.flush.force_metadata,
            enable_page_cache: self.flush.enable_page_cache,
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            max_segment_size: self.storage.max_segment_size,
            max_message_size: self.storage.max_message_size,
            retention: Duration::from_millis(self.storage.retention_ms),
            sparse_interval: self.storage.sparse_interval,
            flush: self.flush_config(),
        }
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.server.submit_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    pub fn retention_check(&self) -> Duration {
        Duration::from_millis(self.storage.retention_check_ms)
    }
}
