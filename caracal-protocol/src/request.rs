use bytes::Bytes;
use std::fmt;
use std::time::Instant;

use crate::response::ReplySink;

/// Routing tag for a parsed request; the orchestrator dispatches on it
/// through the processor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Health,
    ListTopics,
    CreateTopic,
    DeleteTopic,
    Publish,
    Consume,
    Metrics,
}

impl RequestKind {
    pub const ALL: [RequestKind; 7] = [
        RequestKind::Health,
        RequestKind::ListTopics,
        RequestKind::CreateTopic,
        RequestKind::DeleteTopic,
        RequestKind::Publish,
        RequestKind::Consume,
        RequestKind::Metrics,
    ];
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Health => "health",
            RequestKind::ListTopics => "list_topics",
            RequestKind::CreateTopic => "create_topic",
            RequestKind::DeleteTopic => "delete_topic",
            RequestKind::Publish => "publish",
            RequestKind::Consume => "consume",
            RequestKind::Metrics => "metrics",
        };
        f.write_str(name)
    }
}

/// The parsed body of a request, already validated at the HTTP edge.
#[derive(Debug)]
pub enum RequestPayload {
    Health,
    ListTopics,
    CreateTopic { name: String },
    DeleteTopic { name: String },
    Publish { topic: String, data: Bytes },
    Consume { topic: String, offset: u64 },
    Metrics,
}

impl RequestPayload {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestPayload::Health => RequestKind::Health,
            RequestPayload::ListTopics => RequestKind::ListTopics,
            RequestPayload::CreateTopic { .. } => RequestKind::CreateTopic,
            RequestPayload::DeleteTopic { .. } => RequestKind::DeleteTopic,
            RequestPayload::Publish { .. } => RequestKind::Publish,
            RequestPayload::Consume { .. } => RequestKind::Consume,
            RequestPayload::Metrics => RequestKind::Metrics,
        }
    }
}

/// A request travelling from a network task to an I/O worker.
///
/// Carries the capability to complete the client's response; the network
/// task holds the other end of the sink and is awaiting it.
#[derive(Debug)]
pub struct AsyncRequest {
    pub request_id: u64,
    pub payload: RequestPayload,
    /// Processors refuse work whose deadline already passed.
    pub deadline: Option<Instant>,
    pub reply: ReplySink,
}

impl AsyncRequest {
    pub fn new(
        request_id: u64,
        payload: RequestPayload,
        deadline: Option<Instant>,
        reply: ReplySink,
    ) -> Self {
        Self {
            request_id,
            payload,
            deadline,
            reply,
        }
    }

    pub fn kind(&self) -> RequestKind {
        self.payload.kind()
    }

    pub fn deadline_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
