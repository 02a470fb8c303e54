//! Operational endpoints: health probe and live-connection listing.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use focal_core::Role;

use crate::AppState;

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "connections": state.bus.registry().len(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Serialize)]
pub struct ConnectionInfo {
    pub connection_id: Uuid,
    pub user_id: i64,
    pub role: Role,
    pub branch_id: Option<i64>,
    pub connected_at: DateTime<Utc>,
    /// Frames currently buffered for this connection.
    pub queued: usize,
    /// Frames evicted from this connection's queue since it opened.
    pub dropped: u64,
}

#[derive(Debug, Serialize)]
pub struct ConnectionsResponse {
    pub total: usize,
    pub connections: Vec<ConnectionInfo>,
}

/// GET /api/v1/connections
///
/// Ops view of the live registry; not meant for end users.
pub async fn list_connections(State(state): State<AppState>) -> Json<ConnectionsResponse> {
    let snapshot = state.bus.registry().snapshot();
    let connections: Vec<ConnectionInfo> = snapshot
        .iter()
        .map(|handle| ConnectionInfo {
            connection_id: handle.subscription.connection_id,
            user_id: handle.subscription.user_id,
            role: handle.subscription.role,
            branch_id: handle.subscription.branch_id,
            connected_at: handle.subscription.connected_at,
            queued: handle.queue.len(),
            dropped: handle.queue.dropped(),
        })
        .collect();

    Json(ConnectionsResponse {
        total: connections.len(),
        connections,
    })
}
