//! Event intake and replay endpoints.
//!
//! `POST /api/v1/events` is the collaborator seam: upstream services
//! (appointments, prescriptions, inventory, ...) report domain facts here
//! and this server appends, projects, and fans out. `GET /api/v1/events`
//! is the durable replay page for collaborators resuming from a cursor.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use focal_core::defaults::{EVENT_PAGE_LIMIT, EVENT_PAGE_LIMIT_MAX};
use focal_core::{Event, EventType, NewEvent};
use focal_realtime::EventReceipt;

use crate::error::ApiError;
use crate::AppState;

/// Inbound event from a collaborator service.
#[derive(Debug, Deserialize)]
pub struct IngestEventRequest {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub branch_id: Option<i64>,
    #[serde(default)]
    pub actor_user_id: Option<i64>,
    #[serde(default)]
    pub payload: Value,
}

/// POST /api/v1/events
///
/// Appends the event, projects notifications, and pushes them to live
/// connections. Unroutable event types are stored and acknowledged with
/// `routed: false`; only validation failures reject the request.
pub async fn ingest_event(
    State(state): State<AppState>,
    Json(body): Json<IngestEventRequest>,
) -> Result<(StatusCode, Json<EventReceipt>), ApiError> {
    let mut draft = NewEvent::new(body.event_type, body.occurred_at);
    if let Some(branch_id) = body.branch_id {
        draft = draft.with_branch(branch_id);
    }
    if let Some(actor) = body.actor_user_id {
        draft = draft.with_actor(actor);
    }
    if !body.payload.is_null() {
        draft = draft.with_payload(body.payload);
    }

    let receipt = state.distributor.ingest(draft).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Resume after this event id; omit or 0 to start from the beginning.
    #[serde(default)]
    pub since_id: Option<i64>,
    /// Page size, default 100, capped at 1000.
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EventsPage {
    pub events: Vec<Event>,
    /// Pass as `since_id` for the next page; null when this page is empty.
    pub next_cursor: Option<i64>,
    pub has_more: bool,
}

/// GET /api/v1/events?since_id=&limit=
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsPage>, ApiError> {
    let since_id = query.since_id.unwrap_or(0).max(0);
    let limit = query
        .limit
        .unwrap_or(EVENT_PAGE_LIMIT)
        .clamp(1, EVENT_PAGE_LIMIT_MAX);

    // Fetch one past the page to detect has_more without a count query.
    // The repository caps reads at EVENT_PAGE_LIMIT_MAX, so at the cap a
    // full page reports has_more and the follow-up returns an empty page.
    let probe = (limit + 1).min(EVENT_PAGE_LIMIT_MAX);
    let mut events = state
        .distributor
        .events()
        .read_since(since_id, probe)
        .await?;

    let has_more = if probe > limit {
        events.len() as i64 > limit
    } else {
        events.len() as i64 == limit
    };
    events.truncate(limit as usize);
    let next_cursor = events.last().map(|e| e.id);

    Ok(Json(EventsPage {
        events,
        next_cursor,
        has_more,
    }))
}
