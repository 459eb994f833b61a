//! Caracal Protocol - Request/response envelopes and the hand-off queues
//!
//! Defines the JSON payloads of the HTTP surface, the async request and
//! response envelopes carrying reply capabilities, the bounded channels
//! isolating network tasks from I/O workers, and the processor trait the
//! orchestrator dispatches through.

pub mod api;
pub mod channel;
pub mod request;
pub mod response;

pub use api::RequestProcessor;
pub use channel::{
    bounded, RequestSubmitter, RequestTaker, ResponseSubmitter, ResponseTaker, Submitter, Taker,
    DEFAULT_CHANNEL_CAPACITY,
};
pub use request::{AsyncRequest, RequestKind, RequestPayload};
pub use response::{status_for, AsyncResponse, HttpReply, ReplySink, CONTENT_TYPE_JSON};
