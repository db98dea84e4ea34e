// Copyright 2026 The Streamlens Project
// SPDX-License-Identifier: Apache-2.0

// Observing reverse proxy.
//
// Responsibilities:
// - Forward every request via the injected UpstreamClient trait
// - Classify the upstream response content-type once, before anything
//   is wrapped
// - Tee streaming responses through a BodyStreamTap; everything else
//   passes through untouched and generates no events
// - Heartbeat and connection-inspection endpoints under a reserved
//   path prefix

use crate::classify::classify;
use crate::session::SessionRegistry;
use crate::store::ConnectionStore;
use crate::tap::{BodyStreamTap, ChunkResult};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// Reserved path prefix for the proxy's own endpoints. Requests under
/// it are never forwarded upstream.
pub const CONTROL_PREFIX: &str = "/__streamlens";

/// Cap on buffered request bodies.
pub const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Inbound request data forwarded to the upstream client.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: Method,
    /// Path plus query, as received.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A chunked response body.
pub type BodyStream = Pin<Box<dyn Stream<Item = ChunkResult> + Send>>;

/// Response received from upstream, body still streaming.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

/// Errors that can occur during upstream forwarding.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let (status, public_message) = match &self {
            ProxyError::UpstreamFailure(_) => {
                (StatusCode::BAD_GATEWAY, "upstream request failed")
            }
            ProxyError::UpstreamTimeout(_) => {
                (StatusCode::GATEWAY_TIMEOUT, "upstream request timed out")
            }
        };
        (status, public_message.to_string()).into_response()
    }
}

// ---------------------------------------------------------------------------
// Header hygiene
// ---------------------------------------------------------------------------

/// Hop-by-hop headers that must not be forwarded in either direction.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Strip hop-by-hop headers. All other headers are preserved unchanged.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

// ---------------------------------------------------------------------------
// Trait: UpstreamClient (dependency injection point)
// ---------------------------------------------------------------------------

/// Abstraction over the HTTP client that forwards requests upstream.
///
/// Implementations must be Send + Sync so they can be shared across
/// request handlers via `Arc`.
#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    /// The absolute URL a proxied path resolves to. Labels the
    /// connection a streaming response creates.
    fn resolve(&self, path_and_query: &str) -> String;

    async fn forward(&self, request: ProxyRequest) -> Result<UpstreamResponse, ProxyError>;
}

// ---------------------------------------------------------------------------
// Reqwest-backed upstream client
// ---------------------------------------------------------------------------

/// Forwards requests to a fixed upstream base URL.
pub struct ReqwestUpstreamClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestUpstreamClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }
}

#[async_trait::async_trait]
impl UpstreamClient for ReqwestUpstreamClient {
    fn resolve(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    async fn forward(&self, request: ProxyRequest) -> Result<UpstreamResponse, ProxyError> {
        let url = self.resolve(&request.path_and_query);

        let mut headers = request.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        let response = self
            .client
            .request(request.method, &url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProxyError::UpstreamTimeout(e.to_string())
                } else {
                    ProxyError::UpstreamFailure(e.to_string())
                }
            })?;

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);
        // The body is re-streamed chunk by chunk.
        headers.remove(header::CONTENT_LENGTH);

        let body = futures_util::StreamExt::map(response.bytes_stream(), |item| {
            item.map_err(|e| Box::new(e) as crate::tap::BoxError)
        });

        Ok(UpstreamResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn UpstreamClient>,
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<ConnectionStore>,
    pub tap_channel_capacity: usize,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Heartbeat endpoint: GET /__streamlens/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// GET /__streamlens/connections -> recorded connections as JSON.
pub async fn list_connections(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.all())
}

/// DELETE /__streamlens/connections -> drop all records and sessions.
pub async fn clear_connections(State(state): State<AppState>) -> StatusCode {
    state.store.clear();
    state.registry.clear();
    StatusCode::NO_CONTENT
}

/// Forwarding handler for everything outside the control prefix.
///
/// The upstream response is classified exactly once; a response
/// matching no streaming marker is returned as-is and no session ever
/// exists for it.
pub async fn observe_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> axum::response::Response {
    let method = request.method().clone();
    let headers = request.headers().clone();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let body = match axum::body::to_bytes(request.into_body(), MAX_REQUEST_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("failed to read request body: {e}"),
            )
                .into_response()
        }
    };

    let upstream_response = match state
        .upstream
        .forward(ProxyRequest {
            method,
            path_and_query: path_and_query.clone(),
            headers,
            body,
        })
        .await
    {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    let content_type = upstream_response
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let kind = classify(content_type);

    let body = match (kind.decode_kind(), kind.fetch_transport()) {
        (Some(decode_kind), Some(transport)) => {
            let url = state.upstream.resolve(&path_and_query);
            let id = state.registry.create_session(url, transport, decode_kind);
            state.registry.signal_open(&id);

            let tap = BodyStreamTap::new(Arc::clone(&state.registry), state.tap_channel_capacity);
            Body::from_stream(tap.observe(id, upstream_response.body))
        }
        _ => Body::from_stream(upstream_response.body),
    };

    let mut response = Response::builder().status(upstream_response.status);
    if let Some(h) = response.headers_mut() {
        *h = upstream_response.headers;
    }
    match response.body(body) {
        Ok(r) => r.into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to build response: {e}"),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router: control endpoints plus the forwarding
/// fallback. The upstream client is injected, never hard-coded.
pub fn build_router(
    upstream: Arc<dyn UpstreamClient>,
    registry: Arc<SessionRegistry>,
    store: Arc<ConnectionStore>,
    tap_channel_capacity: usize,
) -> Router {
    let state = AppState {
        upstream,
        registry,
        store,
        tap_channel_capacity,
    };

    Router::new()
        .route(&format!("{CONTROL_PREFIX}/heartbeat"), get(heartbeat))
        .route(
            &format!("{CONTROL_PREFIX}/connections"),
            get(list_connections).delete(clear_connections),
        )
        .fallback(observe_handler)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
