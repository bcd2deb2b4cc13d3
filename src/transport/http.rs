//! HTTP request layer.
//!
//! Serves the game over axum. Players and props call the JSON endpoints
//! under `/api`, the operator console uses `/api/admin/*`, and displays
//! follow the game through a Server-Sent Events stream on `GET /api/events`
//! that carries one `StateUpdated` event per committed snapshot.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::game::{BombEngine, Snapshot};
use crate::notifier::BroadcastNotifier;
use crate::observability::metrics;

/// SSE event name carrying a full snapshot.
pub const STATE_UPDATED: &str = "StateUpdated";

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Address to bind to, e.g. `"0.0.0.0:8080"`.
    pub bind_addr: String,
    /// Maximum allowed request body size in bytes.
    pub max_body_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: super::DEFAULT_BIND_ADDR.to_string(),
            max_body_size: super::DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// A connected state stream viewer.
#[derive(Debug)]
struct ViewerState {
    remote_addr: SocketAddr,
    connected_at: Instant,
}

/// Shared state between the axum handlers and [`HttpServer`].
struct AppState {
    engine: BombEngine,
    broadcast: BroadcastNotifier,
    viewers: Arc<DashMap<u64, ViewerState>>,
    next_viewer_id: AtomicU64,
    cancel: CancellationToken,
}

/// RAII guard that removes a viewer from the `DashMap` on drop.
///
/// Lives inside the SSE stream, so the viewer is forgotten whenever the
/// stream is dropped, however the client went away.
struct ViewerGuard {
    viewers: Arc<DashMap<u64, ViewerState>>,
    viewer_id: u64,
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        if let Some((_, viewer)) = self.viewers.remove(&self.viewer_id) {
            debug!(
                viewer_id = self.viewer_id,
                remote_addr = %viewer.remote_addr,
                connected_secs = viewer.connected_at.elapsed().as_secs(),
                "viewer disconnected"
            );
        }
        metrics::set_viewers_active(self.viewers.len());
    }
}

/// The running HTTP server.
pub struct HttpServer {
    state: Arc<AppState>,
    handle: JoinHandle<()>,
}

impl HttpServer {
    /// Binds the server and starts serving in the background.
    ///
    /// Returns the server and the actual bound address (useful when binding
    /// to port 0 in tests). Serving stops when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the TCP listener cannot bind.
    pub async fn bind(
        config: &HttpConfig,
        engine: BombEngine,
        broadcast: BroadcastNotifier,
        cancel: CancellationToken,
    ) -> Result<(Self, SocketAddr), TransportError> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("bind failed: {e}")))?;

        let bound_addr = listener
            .local_addr()
            .map_err(|e| TransportError::ConnectionFailed(format!("local_addr failed: {e}")))?;

        let state = Arc::new(AppState {
            engine,
            broadcast,
            viewers: Arc::new(DashMap::new()),
            next_viewer_id: AtomicU64::new(1),
            cancel: cancel.clone(),
        });

        let router = build_router(Arc::clone(&state), config.max_body_size);
        let service = router.into_make_service_with_connect_info::<SocketAddr>();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, service)
                .with_graceful_shutdown(async move {
                    cancel.cancelled().await;
                })
                .await
            {
                warn!(error = %e, "HTTP server stopped with error");
            }
            debug!("HTTP server shut down");
        });

        info!(%bound_addr, "HTTP server listening");

        Ok((Self { state, handle }, bound_addr))
    }

    /// Waits for the server task to finish.
    ///
    /// Open state streams end once the cancel token fires, so this
    /// returns even with displays attached.
    pub async fn wait(self) {
        debug!(viewers = self.state.viewers.len(), "draining HTTP server");
        if let Err(e) = self.handle.await {
            warn!(error = %e, "HTTP server task ended abnormally");
        }
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("viewers", &self.state.viewers.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Axum Router
// ============================================================================

/// Builds the axum router for every game endpoint.
fn build_router(state: Arc<AppState>, max_body_size: usize) -> Router {
    let body_limit = axum::extract::DefaultBodyLimit::max(max_body_size);

    Router::new()
        .route("/api/state", get(handle_state))
        .route("/api/events", get(handle_events))
        .route("/api/submit-code", post(handle_submit_code))
        .route("/api/activation/state", get(handle_state))
        .route("/api/activation/press", post(handle_press))
        .route("/api/admin/pause", post(handle_pause))
        .route("/api/admin/resume", post(handle_resume))
        .route("/api/admin/reset", post(handle_reset))
        .route("/api/admin/registerfail", post(handle_register_fail))
        .route("/api/admin/undofail", post(handle_undo_fail))
        .route("/api/admin/undoFail", post(handle_undo_fail))
        .route("/api/admin/set-time", post(handle_set_time))
        .layer(body_limit)
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    success: bool,
    reason: String,
}

#[derive(Debug, Serialize)]
struct PressResponse {
    completed: bool,
    msg: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Parses a JSON object body.
fn parse_object(body: &[u8]) -> Result<serde_json::Map<String, Value>, Response> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(bad_request("expected a JSON object")),
        Err(e) => Err(bad_request(format!("invalid JSON: {e}"))),
    }
}

/// `GET /api/state` and `GET /api/activation/state`.
async fn handle_state(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.engine.state())
}

/// `POST /api/submit-code`.
///
/// Accepts `{"code": "..."}` or the code as plain text.
async fn handle_submit_code(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let text = String::from_utf8_lossy(&body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return submit_rejected("missing code");
    }

    let code = if trimmed.starts_with('{') {
        let map = match parse_object(trimmed.as_bytes()) {
            Ok(map) => map,
            Err(_) => return submit_rejected("invalid JSON body"),
        };
        match map.get("code") {
            Some(Value::String(code)) => code.clone(),
            Some(Value::Null) => String::new(),
            Some(_) => return submit_rejected("'code' must be a string"),
            None => return submit_rejected("missing 'code' property"),
        }
    } else {
        trimmed.to_string()
    };

    match state.engine.submit_code(&code).await {
        Ok(outcome) => {
            let status = if outcome.success {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            (
                status,
                Json(SubmitResponse {
                    success: outcome.success,
                    reason: outcome.reason,
                }),
            )
                .into_response()
        }
        Err(e) => submit_rejected(e.message()),
    }
}

fn submit_rejected(reason: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(SubmitResponse {
            success: false,
            reason: reason.to_string(),
        }),
    )
        .into_response()
}

/// `POST /api/activation/press`.
///
/// Accepts `{"color": "..."}`; `wire` is accepted as an alias.
async fn handle_press(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let map = match parse_object(&body) {
        Ok(map) => map,
        Err(resp) => return resp,
    };
    let Some(Value::String(wire)) = map.get("color").or_else(|| map.get("wire")) else {
        return bad_request("missing 'color' property");
    };

    match state.engine.press_wire(wire).await {
        Ok(outcome) => Json(PressResponse {
            completed: outcome.completed,
            msg: outcome.message,
        })
        .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(PressResponse {
                completed: false,
                msg: e.message().to_string(),
            }),
        )
            .into_response(),
    }
}

/// `POST /api/admin/pause`.
async fn handle_pause(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.engine.pause().await)
}

/// `POST /api/admin/resume`.
async fn handle_resume(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.engine.resume().await)
}

/// `POST /api/admin/reset`.
async fn handle_reset(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.engine.reset().await)
}

/// `POST /api/admin/registerfail`.
async fn handle_register_fail(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.engine.register_fail().await)
}

/// `POST /api/admin/undofail`.
async fn handle_undo_fail(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.engine.undo_fail().await)
}

/// `POST /api/admin/set-time`.
///
/// Body: `{"seconds": <int>, "autostart": <bool>?}`.
async fn handle_set_time(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    if body.iter().all(u8::is_ascii_whitespace) {
        return bad_request("missing body");
    }
    let map = match parse_object(&body) {
        Ok(map) => map,
        Err(resp) => return resp,
    };

    let seconds = match map.get("seconds") {
        None => return bad_request("missing 'seconds'"),
        Some(value) => match value.as_i64() {
            Some(seconds) => seconds,
            None => return bad_request("'seconds' must be an integer"),
        },
    };
    let autostart = match map.get("autostart") {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => return bad_request("'autostart' must be a boolean"),
    };

    Json(state.engine.set_time(seconds, autostart).await).into_response()
}

/// `GET /api/events` handler.
///
/// Sends the current snapshot first, then every snapshot the engine
/// commits. Lagging viewers skip ahead to the newest snapshots. The
/// stream ends when the server shuts down.
async fn handle_events(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    // Subscribe before reading the state so nothing falls in between
    let rx = state.broadcast.subscribe();
    let current = state.engine.state();

    let viewer_id = state.next_viewer_id.fetch_add(1, Ordering::SeqCst);
    state.viewers.insert(
        viewer_id,
        ViewerState {
            remote_addr,
            connected_at: Instant::now(),
        },
    );
    metrics::set_viewers_active(state.viewers.len());
    debug!(
        viewer_id,
        %remote_addr,
        subscribers = state.broadcast.receiver_count(),
        "viewer connected"
    );

    let guard = ViewerGuard {
        viewers: Arc::clone(&state.viewers),
        viewer_id,
    };

    let updates = BroadcastStream::new(rx).filter_map(move |result| {
        let _guard = &guard;
        match result {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                debug!(viewer_id, error = %e, "viewer lagged");
                None
            }
        }
    });

    let stream = tokio_stream::once(current)
        .chain(updates)
        .filter_map(|snapshot| state_event(&snapshot).map(Ok));
    // Broadcast senders outlive the server, so end on cancel instead
    let stream =
        futures_util::StreamExt::take_until(stream, state.cancel.clone().cancelled_owned());

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn state_event(snapshot: &Snapshot) -> Option<SseEvent> {
    match SseEvent::default().event(STATE_UPDATED).json_data(snapshot) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "failed to encode snapshot");
            None
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parses a bind address string into a full `host:port` form.
///
/// Accepts:
/// - `:8080` → `0.0.0.0:8080`
/// - `8080` → `0.0.0.0:8080`
/// - `1.2.3.4:8080` → as-is
///
/// # Errors
///
/// Returns [`TransportError::ConnectionFailed`] if the result cannot be
/// parsed as a valid socket address.
pub fn parse_bind_addr(input: &str) -> Result<String, TransportError> {
    let addr = if input.starts_with(':') {
        format!("0.0.0.0{input}")
    } else if input.parse::<u16>().is_ok() {
        format!("0.0.0.0:{input}")
    } else {
        input.to_string()
    };
    addr.parse::<SocketAddr>().map_err(|e| {
        TransportError::ConnectionFailed(format!("invalid bind address \"{input}\": {e}"))
    })?;
    Ok(addr)
}

// ============================================================================
// Tests
// ============================================================================
