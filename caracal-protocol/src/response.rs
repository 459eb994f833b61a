use bytes::Bytes;
use caracal_core::BrokerError;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::api::ErrorResponse;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// The completed HTTP exchange: status, content type, and body, handed
/// back to the network side through the reply sink.
#[derive(Debug)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Bytes,
}

/// Capability to complete one client response. Owning a sink does not
/// mean owning the socket; the network task holding the other end writes
/// the actual bytes.
#[derive(Debug)]
pub struct ReplySink {
    tx: oneshot::Sender<HttpReply>,
}

impl ReplySink {
    pub fn new() -> (Self, oneshot::Receiver<HttpReply>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Deliver the reply; false when the client already went away.
    pub fn complete(self, reply: HttpReply) -> bool {
        self.tx.send(reply).is_ok()
    }
}

/// HTTP status for an engine error, per the propagation policy.
pub fn status_for(err: &BrokerError) -> u16 {
    match err {
        BrokerError::InvalidArgument(_) => 400,
        BrokerError::NotFound(_) => 404,
        BrokerError::AlreadyExists(_) => 409,
        BrokerError::Backpressure | BrokerError::Full => 503,
        BrokerError::Timeout => 504,
        BrokerError::Corrupt(_)
        | BrokerError::Io(_)
        | BrokerError::Closed(_)
        | BrokerError::Config(_) => 500,
    }
}

/// A processed response travelling from an I/O worker to a response
/// worker, which completes the sink.
#[derive(Debug)]
pub struct AsyncResponse {
    pub request_id: u64,
    pub status: u16,
    pub content_type: &'static str,
    pub body: Bytes,
    pub reply: ReplySink,
}

impl AsyncResponse {
    pub fn json<T: Serialize>(request_id: u64, status: u16, body: &T, reply: ReplySink) -> Self {
        match serde_json::to_vec(body) {
            Ok(encoded) => Self {
                request_id,
                status,
                content_type: CONTENT_TYPE_JSON,
                body: Bytes::from(encoded),
                reply,
            },
            Err(e) => Self::error(request_id, 500, format!("encoding response: {e}"), reply),
        }
    }

    pub fn empty(request_id: u64, status: u16, reply: ReplySink) -> Self {
        Self {
            request_id,
            status,
            content_type: CONTENT_TYPE_JSON,
            body: Bytes::new(),
            reply,
        }
    }

    pub fn error(
        request_id: u64,
        status: u16,
        message: impl Into<String>,
        reply: ReplySink,
    ) -> Self {
        let body = ErrorResponse {
            error: message.into(),
        };
        let encoded = serde_json::to_vec(&body).unwrap_or_default();
        Self {
            request_id,
            status,
            content_type: CONTENT_TYPE_JSON,
            body: Bytes::from(encoded),
            reply,
        }
    }

    pub fn from_error(request_id: u64, err: &BrokerError, reply: ReplySink) -> Self {
        Self::error(request_id, status_for(err), err.to_string(), reply)
    }

    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// Send the reply through the sink; false when the client is gone.
    pub fn complete(self) -> bool {
        self.reply.complete(HttpReply {
            status: self.status,
            content_type: self.content_type,
            body: self.body,
        })
    }
}
