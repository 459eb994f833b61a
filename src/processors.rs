use async_trait::async_trait;
use caracal_core::BrokerError;
use caracal_protocol::api::{
    ConsumeMessageResponse, HealthResponse, MetricsResponse as MetricsBody,
    PublishMessageResponse, TopicListResponse, TopicResponse,
};
use caracal_protocol::{AsyncRequest, AsyncResponse, RequestKind, RequestPayload, RequestProcessor};
use caracal_storage::TopicRegistry;
use std::collections::HashMap;
use std::sync::Arc;

use crate::consumer::Consumer;
use crate::metrics::Metrics;
use crate::producer::Producer;

/// Explicit route table mapping request kinds to their processors. This
/// is the whole dispatch surface; there is no scanning or registration
/// machinery behind it.
pub fn processor_table(
    registry: Arc<TopicRegistry>,
    producer: Arc<Producer>,
    consumer: Arc<Consumer>,
    metrics: Arc<Metrics>,
) -> HashMap<RequestKind, Arc<dyn RequestProcessor>> {
    let mut table: HashMap<RequestKind, Arc<dyn RequestProcessor>> = HashMap::new();
    table.insert(RequestKind::Health, Arc::new(HealthProcessor));
    table.insert(
        RequestKind::ListTopics,
        Arc::new(ListTopicsProcessor {
            registry: registry.clone(),
        }),
    );
    table.insert(
        RequestKind::CreateTopic,
        Arc::new(CreateTopicProcessor {
            registry: registry.clone(),
        }),
    );
    table.insert(
        RequestKind::DeleteTopic,
        Arc::new(DeleteTopicProcessor { registry }),
    );
    table.insert(RequestKind::Publish, Arc::new(PublishProcessor { producer }));
    table.insert(RequestKind::Consume, Arc::new(ConsumeProcessor { consumer }));
    table.insert(RequestKind::Metrics, Arc::new(MetricsProcessor { metrics }));
    table
}

/// Reject work whose deadline passed before the processor got to it.
fn check_deadline(request: AsyncRequest) -> Result<AsyncRequest, AsyncResponse> {
    if request.deadline_expired() {
        let AsyncRequest {
            request_id, reply, ..
        } = request;
        Err(AsyncResponse::from_error(
            request_id,
            &BrokerError::Timeout,
            reply,
        ))
    } else {
        Ok(request)
    }
}

pub struct HealthProcessor;

#[async_trait]
impl RequestProcessor for HealthProcessor {
    async fn process(&self, request: AsyncRequest) -> AsyncResponse {
        let AsyncRequest {
            request_id, reply, ..
        } = request;
        AsyncResponse::json(
            request_id,
            200,
            &HealthResponse {
                status: "ok".to_string(),
                message: "caracal broker is alive".to_string(),
            },
            reply,
        )
    }
}

pub struct ListTopicsProcessor {
    registry: Arc<TopicRegistry>,
}

#[async_trait]
impl RequestProcessor for ListTopicsProcessor {
    async fn process(&self, request: AsyncRequest) -> AsyncResponse {
        let request = match check_deadline(request) {
            Ok(request) => request,
            Err(response) => return response,
        };
        let AsyncRequest {
            request_id, reply, ..
        } = request;
        AsyncResponse::json(
            request_id,
            200,
            &TopicListResponse {
                topics: self.registry.list(),
            },
            reply,
        )
    }
}

pub struct CreateTopicProcessor {
    registry: Arc<TopicRegistry>,
}

#[async_trait]
impl RequestProcessor for CreateTopicProcessor {
    async fn process(&self, request: AsyncRequest) -> AsyncResponse {
        let request = match check_deadline(request) {
            Ok(request) => request,
            Err(response) => return response,
        };
        let AsyncRequest {
            request_id,
            payload,
            reply,
            ..
        } = request;
        let RequestPayload::CreateTopic { name } = payload else {
            return AsyncResponse::error(request_id, 500, "mismatched payload", reply);
        };
        match self.registry.create(&name) {
            Ok(_) => AsyncResponse::json(request_id, 201, &TopicResponse { name }, reply),
            Err(e) => AsyncResponse::from_error(request_id, &e, reply),
        }
    }
}

pub struct DeleteTopicProcessor {
    registry: Arc<TopicRegistry>,
}

#[async_trait]
impl RequestProcessor for DeleteTopicProcessor {
    async fn process(&self, request: AsyncRequest) -> AsyncResponse {
        let request = match check_deadline(request) {
            Ok(request) => request,
            Err(response) => return response,
        };
        let AsyncRequest {
            request_id,
            payload,
            reply,
            ..
        } = request;
        let RequestPayload::DeleteTopic { name } = payload else {
            return AsyncResponse::error(request_id, 500, "mismatched payload", reply);
        };
        match self.registry.delete(&name) {
            Ok(()) => AsyncResponse::empty(request_id, 204, reply),
            Err(e) => AsyncResponse::from_error(request_id, &e, reply),
        }
    }
}

pub struct PublishProcessor {
    producer: Arc<Producer>,
}

#[async_trait]
impl RequestProcessor for PublishProcessor {
    async fn process(&self, request: AsyncRequest) -> AsyncResponse {
        let request = match check_deadline(request) {
            Ok(request) => request,
            Err(response) => return response,
        };
        let AsyncRequest {
            request_id,
            payload,
            reply,
            ..
        } = request;
        let RequestPayload::Publish { topic, data } = payload else {
            return AsyncResponse::error(request_id, 500, "mismatched payload", reply);
        };
        match self.producer.publish(&topic, data) {
            Ok(record) => AsyncResponse::json(
                request_id,
                200,
                &PublishMessageResponse {
                    offset: record.offset.as_u64(),
                    timestamp: record.timestamp,
                },
                reply,
            ),
            Err(e) => AsyncResponse::from_error(request_id, &e, reply),
        }
    }
}

pub struct ConsumeProcessor {
    consumer: Arc<Consumer>,
}

#[async_trait]
impl RequestProcessor for ConsumeProcessor {
    async fn process(&self, request: AsyncRequest) -> AsyncResponse {
        let request = match check_deadline(request) {
            Ok(request) => request,
            Err(response) => return response,
        };
        let AsyncRequest {
            request_id,
            payload,
            reply,
            ..
        } = request;
        let RequestPayload::Consume { topic, offset } = payload else {
            return AsyncResponse::error(request_id, 500, "mismatched payload", reply);
        };
        match self.consumer.consume(&topic, offset) {
            Ok(record) => AsyncResponse::json(
                request_id,
                200,
                &ConsumeMessageResponse {
                    offset: record.offset.as_u64(),
                    timestamp: record.timestamp,
                    data: String::from_utf8_lossy(&record.data).into_owned(),
                },
                reply,
            ),
            Err(e) => AsyncResponse::from_error(request_id, &e, reply),
        }
    }
}

pub struct MetricsProcessor {
    metrics: Arc<Metrics>,
}

#[async_trait]
impl RequestProcessor for MetricsProcessor {
    async fn process(&self, request: AsyncRequest) -> AsyncResponse {
        let AsyncRequest {
            request_id, reply, ..
        } = request;
        let snapshot: MetricsBody = self.metrics.snapshot();
        AsyncResponse::json(request_id, 200, &snapshot, reply)
    }
}
