use caracal_core::Result;
use caracal_protocol::{bounded, RequestSubmitter};
use caracal_storage::TopicRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::config::BrokerConfig;
use crate::consumer::Consumer;
use crate::metrics::Metrics;
use crate::pipeline::Pipeline;
use crate::processors::processor_table;
use crate::producer::Producer;
use crate::server::AppState;

/// The assembled broker: storage engine, processor table, worker pools,
/// and the retention sweeper.
///
/// Construction is explicit and configuration-driven; there is no global
/// container. Tests build a fresh broker per case.
pub struct Broker {
    config: BrokerConfig,
    registry: Arc<TopicRegistry>,
    submitter: RequestSubmitter,
    pipeline: Pipeline,
    retention_sweeper: JoinHandle<()>,
}

impl Broker {
    pub fn build(config: BrokerConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(TopicRegistry::new(
            &config.data_directory,
            config.log_config(),
        )?);
        let metrics = Arc::new(Metrics::default());
        let producer = Arc::new(Producer::new(registry.clone(), metrics.clone()));
        let consumer = Arc::new(Consumer::new(registry.clone(), metrics.clone()));
        let table = processor_table(registry.clone(), producer, consumer, metrics.clone());

        let (submitter, taker) = bounded(config.server.request_queue_size);
        let pipeline = Pipeline::start(
            taker,
            table,
            metrics,
            config.server.thread_pool_size,
            config.server.response_pool_size,
            config.server.request_queue_size,
        );
        let retention_sweeper =
            spawn_retention_sweeper(registry.clone(), config.retention_check());

        info!(
            data_dir = %config.data_directory.display(),
            request_workers = config.server.thread_pool_size,
            response_workers = config.server.response_pool_size,
            "broker assembled"
        );

        Ok(Self {
            config,
            registry,
            submitter,
            pipeline,
            retention_sweeper,
        })
    }

    /// State handed to the HTTP layer: a channel handle plus timeouts.
    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.submitter.clone(),
            self.config.submit_timeout(),
            self.config.request_timeout(),
        )
    }

    /// Stop accepting work, drain both worker pools, then flush and
    /// close every log.
    pub async fn shutdown(self) {
        info!("shutting down broker");
        let Broker {
            registry,
            submitter,
            pipeline,
            retention_sweeper,
            ..
        } = self;

        retention_sweeper.abort();
        drop(submitter);
        pipeline.shutdown().await;
        registry.close();
        info!("broker shutdown complete");
    }
}

fn spawn_retention_sweeper(registry: Arc<TopicRegistry>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing can have expired
        // yet at startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            registry.enforce_retention();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlushSettings;
    use bytes::Bytes;
    use caracal_protocol::api::PublishMessageResponse;
    use caracal_protocol::{AsyncRequest, ReplySink, RequestPayload};
    use caracal_storage::FlushStrategy;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> BrokerConfig {
        BrokerConfig {
            data_directory: dir.path().to_path_buf(),
            flush: FlushSettings {
                strategy: FlushStrategy::Immediate,
                ..FlushSettings::default()
            },
            ..BrokerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_build_publish_shutdown() {
        let dir = TempDir::new().unwrap();
        let broker = Broker::build(config(&dir)).unwrap();

        let (sink, rx) = ReplySink::new();
        broker
            .submitter
            .submit(
                AsyncRequest::new(
                    1,
                    RequestPayload::Publish {
                        topic: "t".to_string(),
                        data: Bytes::from_static(b"hello"),
                    },
                    None,
                    sink,
                ),
                Duration::from_millis(200),
            )
            .await
            .unwrap();

        let reply = rx.await.unwrap();
        assert_eq!(reply.status, 200);
        let body: PublishMessageResponse = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(body.offset, 0);

        broker.shutdown().await;
        assert!(dir.path().join("t").exists());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_build() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.server.thread_pool_size = 0;
        assert!(Broker::build(cfg).is_err());
    }
}
