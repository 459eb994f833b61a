use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use caracal_core::Result;
use caracal_protocol::api::{CreateTopicRequest, ErrorResponse, PublishMessageRequest};
use caracal_protocol::{
    status_for, AsyncRequest, HttpReply, ReplySink, RequestPayload, RequestSubmitter,
};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Shared state of the network side: a handle into the request channel
/// and the timeouts applied at the edge.
#[derive(Clone)]
pub struct AppState {
    submitter: RequestSubmitter,
    submit_timeout: Duration,
    request_timeout: Duration,
    request_ids: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        submitter: RequestSubmitter,
        submit_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            submitter,
            submit_timeout,
            request_timeout,
            request_ids: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next_request_id(&self) -> u64 {
        self.request_ids.fetch_add(1, Ordering::Relaxed)
    }
}

/// The broker's REST surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/topics", get(get_topics).post(post_topics))
        .route(
            "/topics/:name",
            get(get_message).post(post_message).delete(delete_topic),
        )
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

/// Bind and serve until the shutdown future resolves.
pub async fn serve(
    router: Router,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn get_health(State(state): State<AppState>) -> Response {
    dispatch(&state, RequestPayload::Health).await
}

async fn get_topics(State(state): State<AppState>) -> Response {
    dispatch(&state, RequestPayload::ListTopics).await
}

async fn post_topics(State(state): State<AppState>, body: Bytes) -> Response {
    match serde_json::from_slice::<CreateTopicRequest>(&body) {
        Ok(request) => dispatch(&state, RequestPayload::CreateTopic { name: request.name }).await,
        Err(e) => error_response(StatusCode::BAD_REQUEST, &format!("malformed JSON body: {e}")),
    }
}

async fn delete_topic(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    dispatch(&state, RequestPayload::DeleteTopic { name }).await
}

async fn post_message(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    match serde_json::from_slice::<PublishMessageRequest>(&body) {
        Ok(request) => {
            dispatch(
                &state,
                RequestPayload::Publish {
                    topic: name,
                    data: Bytes::from(request.data.into_bytes()),
                },
            )
            .await
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, &format!("malformed JSON body: {e}")),
    }
}

async fn get_message(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(raw) = params.get("offset") else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "offset query parameter is required",
        );
    };
    match raw.parse::<u64>() {
        Ok(offset) => {
            dispatch(
                &state,
                RequestPayload::Consume {
                    topic: name,
                    offset,
                },
            )
            .await
        }
        Err(_) => error_response(
            StatusCode::BAD_REQUEST,
            &format!("invalid offset '{raw}': expected a non-negative integer"),
        ),
    }
}

async fn get_metrics(State(state): State<AppState>) -> Response {
    dispatch(&state, RequestPayload::Metrics).await
}

/// Enqueue the request on the channel and await its completion through
/// the reply sink. A queue full past the submit timeout is 503; a sink
/// dropped mid-shutdown is 500.
async fn dispatch(state: &AppState, payload: RequestPayload) -> Response {
    let request_id = state.next_request_id();
    let kind = payload.kind();
    let (reply, rx) = ReplySink::new();
    let deadline = Instant::now() + state.request_timeout;
    let request = AsyncRequest::new(request_id, payload, Some(deadline), reply);

    if let Err(e) = state.submitter.submit(request, state.submit_timeout).await {
        warn!(request_id, %kind, error = %e, "request submission failed");
        let status =
            StatusCode::from_u16(status_for(&e)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return error_response(status, &e.to_string());
    }

    match rx.await {
        Ok(reply) => into_http_response(reply),
        Err(_) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "request dropped during shutdown",
        ),
    }
}

fn into_http_response(reply: HttpReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = axum::http::Response::builder().status(status);
    if !reply.body.is_empty() {
        builder = builder.header(header::CONTENT_TYPE, reply.content_type);
    }
    builder
        .body(Body::from(reply.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}
