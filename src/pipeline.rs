use caracal_protocol::{
    bounded, AsyncRequest, AsyncResponse, RequestKind, RequestProcessor, RequestTaker,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::metrics::Metrics;

/// The I/O side of the broker: orchestrator workers drain the request
/// channel, route through the processor table, and hand finished
/// responses to the response workers over the response channel.
///
/// Neither worker pool owns the other; each holds its own channel
/// handles. Dropping every request submitter closes the request channel,
/// the orchestrators drain and exit, their response submitters drop,
/// and the response workers follow. `shutdown` awaits that cascade.
pub struct Pipeline {
    orchestrators: Vec<JoinHandle<()>>,
    responders: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub fn start(
        requests: RequestTaker,
        table: HashMap<RequestKind, Arc<dyn RequestProcessor>>,
        metrics: Arc<Metrics>,
        orchestrator_workers: usize,
        response_workers: usize,
        response_capacity: usize,
    ) -> Self {
        let (response_tx, response_rx) = bounded::<AsyncResponse>(response_capacity);
        let table = Arc::new(table);

        let orchestrators = (0..orchestrator_workers)
            .map(|worker| {
                let requests = requests.clone();
                let responses = response_tx.clone();
                let table = table.clone();
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    debug!(worker, "request worker started");
                    while let Some(request) = requests.take().await {
                        let request_id = request.request_id;
                        let kind = request.kind();
                        debug!(worker, request_id, %kind, "processing request");

                        let response = match table.get(&kind).cloned() {
                            Some(processor) => processor.process(request).await,
                            None => {
                                let AsyncRequest {
                                    request_id, reply, ..
                                } = request;
                                AsyncResponse::error(
                                    request_id,
                                    500,
                                    format!("no processor registered for '{kind}'"),
                                    reply,
                                )
                            }
                        };

                        if response.is_error() {
                            metrics.incr_error_count();
                        }
                        if responses.send(response).await.is_err() {
                            warn!(worker, "response channel closed, stopping request worker");
                            break;
                        }
                    }
                    debug!(worker, "request worker stopped");
                })
            })
            .collect();
        // The spawned workers hold the only response submitters.
        drop(response_tx);

        let responders = (0..response_workers)
            .map(|worker| {
                let responses = response_rx.clone();
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    debug!(worker, "response worker started");
                    while let Some(response) = responses.take().await {
                        let request_id = response.request_id;
                        metrics.incr_processed_requests();
                        if !response.complete() {
                            debug!(worker, request_id, "client went away before the response");
                        }
                    }
                    debug!(worker, "response worker stopped");
                })
            })
            .collect();

        Self {
            orchestrators,
            responders,
        }
    }

    /// Await every worker. The caller must have dropped all request
    /// submitters first, or this waits forever.
    pub async fn shutdown(self) {
        for handle in self.orchestrators {
            let _ = handle.await;
        }
        for handle in self.responders {
            let _ = handle.await;
        }
        debug!("pipeline drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::Consumer;
    use crate::processors::processor_table;
    use crate::producer::Producer;
    use bytes::Bytes;
    use caracal_protocol::api::{ConsumeMessageResponse, PublishMessageResponse};
    use caracal_protocol::{ReplySink, RequestPayload, RequestSubmitter};
    use caracal_storage::{FlushConfig, LogConfig, TopicRegistry};
    use std::time::Duration;
    use tempfile::TempDir;

    const SHORT: Duration = Duration::from_millis(200);

    struct Harness {
        submitter: RequestSubmitter,
        pipeline: Pipeline,
        metrics: Arc<Metrics>,
        _dir: TempDir,
    }

    fn harness(queue_size: usize, workers: usize) -> Harness {
        let dir = TempDir::new().unwrap();
        let config = LogConfig {
            flush: FlushConfig::immediate(),
            ..LogConfig::default()
        };
        let registry = Arc::new(TopicRegistry::new(dir.path(), config).unwrap());
        let metrics = Arc::new(Metrics::default());
        let producer = Arc::new(Producer::new(registry.clone(), metrics.clone()));
        let consumer = Arc::new(Consumer::new(registry.clone(), metrics.clone()));
        let table = processor_table(registry, producer, consumer, metrics.clone());

        let (submitter, taker) = bounded(queue_size);
        let pipeline = Pipeline::start(taker, table, metrics.clone(), workers, 2, queue_size);
        Harness {
            submitter,
            pipeline,
            metrics,
            _dir: dir,
        }
    }

    async fn roundtrip(
        harness: &Harness,
        request_id: u64,
        payload: RequestPayload,
    ) -> caracal_protocol::HttpReply {
        let (sink, rx) = ReplySink::new();
        harness
            .submitter
            .submit(AsyncRequest::new(request_id, payload, None, sink), SHORT)
            .await
            .unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_publish_consume_through_pipeline() {
        let harness = harness(16, 2);

        let reply = roundtrip(
            &harness,
            1,
            RequestPayload::Publish {
                topic: "t".to_string(),
                data: Bytes::from_static(b"hello"),
            },
        )
        .await;
        assert_eq!(reply.status, 200);
        let published: PublishMessageResponse = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(published.offset, 0);

        let reply = roundtrip(
            &harness,
            2,
            RequestPayload::Consume {
                topic: "t".to_string(),
                offset: 0,
            },
        )
        .await;
        assert_eq!(reply.status, 200);
        let consumed: ConsumeMessageResponse = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(consumed.data, "hello");

        let Harness {
            submitter,
            pipeline,
            metrics,
            ..
        } = harness;
        drop(submitter);
        pipeline.shutdown().await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.processed_requests, 2);
        assert_eq!(snapshot.error_count, 0);
    }

    #[tokio::test]
    async fn test_errors_are_counted_not_fatal() {
        let harness = harness(16, 1);

        // A failing request does not take the worker down.
        let reply = roundtrip(
            &harness,
            1,
            RequestPayload::Consume {
                topic: "missing".to_string(),
                offset: 7,
            },
        )
        .await;
        assert_eq!(reply.status, 404);

        let reply = roundtrip(&harness, 2, RequestPayload::Health).await;
        assert_eq!(reply.status, 200);

        let Harness {
            submitter,
            pipeline,
            metrics,
            ..
        } = harness;
        drop(submitter);
        pipeline.shutdown().await;
        assert_eq!(metrics.snapshot().error_count, 1);
    }

    #[tokio::test]
    async fn test_many_concurrent_publishes_assign_dense_offsets() {
        let harness = harness(64, 4);

        let mut receivers = Vec::new();
        for i in 0..40u64 {
            let (sink, rx) = ReplySink::new();
            harness
                .submitter
                .submit(
                    AsyncRequest::new(
                        i,
                        RequestPayload::Publish {
                            topic: "dense".to_string(),
                            data: Bytes::from(format!("m{i}")),
                        },
                        None,
                        sink,
                    ),
                    SHORT,
                )
                .await
                .unwrap();
            receivers.push(rx);
        }

        let mut offsets = Vec::new();
        for rx in receivers {
            let reply = rx.await.unwrap();
            assert_eq!(reply.status, 200);
            let body: PublishMessageResponse = serde_json::from_slice(&reply.body).unwrap();
            offsets.push(body.offset);
        }
        offsets.sort_unstable();
        assert_eq!(offsets, (0..40).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_shutdown_drains_in_flight_requests() {
        let harness = harness(16, 2);

        let (sink, rx) = ReplySink::new();
        harness
            .submitter
            .submit(
                AsyncRequest::new(
                    1,
                    RequestPayload::Publish {
                        topic: "t".to_string(),
                        data: Bytes::from_static(b"drained"),
                    },
                    None,
                    sink,
                ),
                SHORT,
            )
            .await
            .unwrap();

        let Harness {
            submitter, pipeline, ..
        } = harness;
        drop(submitter);
        pipeline.shutdown().await;

        // The queued request was processed before the workers exited.
        let reply = rx.await.unwrap();
        assert_eq!(reply.status, 200);
    }
}
