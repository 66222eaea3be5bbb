//! Local control endpoint
//!
//! A minimal HTTP server on a fixed port through which the transmitter peer
//! pushes rotation changes back to the receiver. Only `POST /rotate` exists;
//! everything else answers with a JSON error body. A valid rotation updates
//! the shared config and, when a video session is running, fires a restart
//! signal into the pipeline's own context without waiting on it.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::SharedConfig;
use crate::events::{ControlEvent, EventSender};
use crate::pipeline::PipelineHandle;

/// Fixed port of the receiver's control endpoint
pub const CONTROL_PORT: u16 = 8889;

/// Everything the rotate handler touches
pub struct ControlState {
    /// Shared camera configuration
    pub config: SharedConfig,
    /// Handle to the video pipeline collaborator
    pub pipeline: PipelineHandle,
    /// Event dispatcher for surfaced outcomes
    pub events: EventSender,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// `POST /rotate` with body `{"rotate": 0..3}`.
///
/// The body is parsed by hand so each malformed shape gets its own 400
/// message rather than a framework rejection.
async fn rotate(State(state): State<Arc<ControlState>>, body: String) -> Response {
    if body.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "missing body");
    }
    let Ok(value) = serde_json::from_str::<Value>(&body) else {
        return json_error(StatusCode::BAD_REQUEST, "invalid json");
    };
    let Some(rotate) = value.get("rotate").and_then(Value::as_i64) else {
        return json_error(StatusCode::BAD_REQUEST, "rotate must be integer 0-3");
    };
    if !(0..=3).contains(&rotate) {
        return json_error(StatusCode::BAD_REQUEST, "rotate must be 0..3");
    }

    {
        let mut config = state.config.lock().await;
        config.set_rotate(rotate as u8);
    }
    info!("rotate set to {rotate} via control endpoint");
    state.events.emit(ControlEvent::RotateChanged(rotate as u8));

    // Restart is scheduled, never run inline: the pipeline applies it on its
    // own context while this handler returns immediately
    if state.pipeline.is_active() {
        state.pipeline.schedule_restart();
        state.events.emit(ControlEvent::RestartScheduled);
    }

    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

async fn method_not_allowed() -> Response {
    json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

async fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// Build the control router
pub fn router(state: Arc<ControlState>) -> Router {
    Router::new()
        .route("/rotate", post(rotate).fallback(method_not_allowed))
        .fallback(not_found)
        .with_state(state)
}

/// Serve the control endpoint on an existing listener (tests bind port 0)
pub async fn serve_on(state: Arc<ControlState>, listener: TcpListener) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("control endpoint listening on {addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Bind the fixed control port and serve until the task is dropped
pub async fn serve(state: Arc<ControlState>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], CONTROL_PORT));
    let listener = TcpListener::bind(addr).await?;
    serve_on(state, listener).await
}
