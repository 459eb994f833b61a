use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::request::AsyncRequest;
use crate::response::AsyncResponse;

/// One request-type handler: a pure request-to-response function over
/// the storage engine. The orchestrator looks processors up by request
/// kind in an explicit route table.
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    async fn process(&self, request: AsyncRequest) -> AsyncResponse;
}

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// `GET /topics`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicListResponse {
    pub topics: Vec<String>,
}

/// `POST /topics` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTopicRequest {
    pub name: String,
}

/// `POST /topics` success body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicResponse {
    pub name: String,
}

/// `POST /topics/{name}` body; the payload travels as a string and is
/// stored as its raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishMessageRequest {
    pub data: String,
}

/// `POST /topics/{name}` success body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishMessageResponse {
    pub offset: u64,
    pub timestamp: u64,
}

/// `GET /topics/{name}?offset=N` success body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeMessageResponse {
    pub offset: u64,
    pub timestamp: u64,
    pub data: String,
}

/// `GET /metrics`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub producer_messages: u64,
    pub consumer_messages: u64,
    pub processed_requests: u64,
    pub error_count: u64,
}

/// Error envelope for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
