//! HTTP surface for the bridge.
//!
//! Every handler returns the same JSON envelope: `{"status":"ok", ...}` on
//! success and `{"status":"error","error":{"type","message"}}` on failure.
//! Bridge calls that may block (opening a serial port waits for the board to
//! reset) run on the blocking pool.

use axum::{
    extract::State as AxumState,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::error;

use crate::bridge::Bridge;
use crate::error::BridgeError;

#[derive(Clone)]
pub struct RestContext {
    pub bridge: Bridge,
    shutdown: Arc<watch::Sender<bool>>,
}

impl RestContext {
    pub fn new(bridge: Bridge) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            bridge,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Ask long-lived handlers (WebSocket streams) to finish.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub(crate) fn shutdown_requested(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// Errors surfaced by HTTP and WebSocket handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("Background task failed: {0}")]
    Task(#[from] JoinError),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bridge(err) => err.kind(),
            Self::Task(_) => "Task",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Bridge(err) => err.into_response(),
            Self::Task(err) => {
                error!("Blocking bridge call failed: {}", err);
                let body = err_json("Task", &err.to_string());
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ---------- DTOs ----------
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub angle: i64,
}

// ---------- Router Builder ----------
pub fn build_router(ctx: RestContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/history", get(history))
        .route("/api/open", post(open))
        .route("/api/close", post(close))
        .route("/api/command", post(command))
        .route("/ws", get(crate::websocket::ws_handler))
        .with_state(ctx)
}

/// Run a bridge call off the async executor.
pub(crate) async fn blocking<T, F>(bridge: &Bridge, call: F) -> ApiResult<T>
where
    F: FnOnce(&Bridge) -> Result<T, BridgeError> + Send + 'static,
    T: Send + 'static,
{
    let bridge = bridge.clone();
    Ok(tokio::task::spawn_blocking(move || call(&bridge)).await??)
}

// ---------- Handlers ----------
async fn health() -> &'static str {
    "ok"
}

async fn status(AxumState(ctx): AxumState<RestContext>) -> Json<Value> {
    let bridge = &ctx.bridge;
    Json(json!({
        "status": "ok",
        "state": bridge.current_state(),
        "latest": bridge.latest(),
        "stats": bridge.stats(),
    }))
}

async fn history(AxumState(ctx): AxumState<RestContext>) -> Json<Value> {
    let snapshot = ctx.bridge.history_snapshot();
    Json(json!({
        "status": "ok",
        "capacity": snapshot.capacity,
        "distances": snapshot.distances(),
        "motion_indices": snapshot.motion_indices(),
        "readings": snapshot.readings,
    }))
}

async fn open(AxumState(ctx): AxumState<RestContext>) -> ApiResult<Json<Value>> {
    let descriptor = blocking(&ctx.bridge, |bridge| bridge.open_or_fallback()).await?;
    Ok(Json(json!({"status": "ok", "transport": descriptor})))
}

async fn close(AxumState(ctx): AxumState<RestContext>) -> ApiResult<Json<Value>> {
    blocking(&ctx.bridge, |bridge| {
        bridge.close();
        Ok(())
    })
    .await?;
    Ok(Json(json!({"status": "ok", "message": "closed"})))
}

async fn command(
    AxumState(ctx): AxumState<RestContext>,
    Json(req): Json<CommandRequest>,
) -> ApiResult<Json<Value>> {
    let angle = req.angle;
    let bytes = blocking(&ctx.bridge, move |bridge| bridge.send(angle)).await?;
    Ok(Json(json!({"status": "ok", "angle": angle, "bytes_written": bytes})))
}

// ---------- Helpers ----------
pub(crate) fn err_json(kind: &str, msg: &str) -> Value {
    json!({"status":"error","error":{"type":kind,"message":msg}})
}
