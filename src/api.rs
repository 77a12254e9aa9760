//! HTTP endpoints next to the WebSocket.
//!
//! Read-only: everything that changes a room goes through `/ws`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::state::{normalize_room_code, AppState};
use crate::ws;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub rooms: usize,
    /// Arbiter chain in the order it is tried
    pub arbiters: Vec<String>,
}

/// All routes served by the process
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/health", get(health))
        .route("/api/rooms/{code}", get(room_snapshot))
        .with_state(state)
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        rooms: state.room_count().await,
        arbiters: state.referee.tier_names(),
    })
}

/// Current state of one room.
///
/// GET /api/rooms/{code}
///
/// Codes are matched case-insensitively. Draft answers are never included.
pub async fn room_snapshot(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Response {
    match state.get_snapshot(&normalize_room_code(&code)).await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (StatusCode::NOT_FOUND, "Room not found").into_response(),
    }
}
