//! Notification inbox endpoints.
//!
//! The durable rows are the source of truth; clients that miss live frames
//! re-sync here. All endpoints are scoped to the caller's identity: a user
//! sees rows addressed to them plus role-audience rows for their role and
//! branch, and can only mutate what they can see.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use focal_core::{
    ListNotificationsRequest, Notification, NotificationKind, NotificationStatus,
};

use crate::error::ApiError;
use crate::identity::CallerIdentity;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<NotificationStatus>,
    #[serde(default, rename = "type")]
    pub kind: Option<NotificationKind>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub per_page: Option<i64>,
}

/// Laravel-style pagination block, kept for client compatibility.
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub current_page: i64,
    pub last_page: i64,
    pub per_page: i64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct NotificationsPage {
    pub notifications: Vec<Notification>,
    pub pagination: PaginationMeta,
    pub unread_count: i64,
}

/// GET /api/v1/notifications?status=&type=&page=&per_page=
///
/// Newest-first inbox page with the unread badge count alongside, so a
/// client can render list and badge from one round trip.
pub async fn list_notifications(
    State(state): State<AppState>,
    identity: CallerIdentity,
    Query(query): Query<ListQuery>,
) -> Result<Json<NotificationsPage>, ApiError> {
    let scope = identity.scope();
    let request = ListNotificationsRequest {
        status: query.status,
        kind: query.kind,
        page: query.page,
        per_page: query.per_page,
    };
    let per_page = request.per_page();
    let current_page = request.page();

    let listed = state.notifications.list(&scope, request).await?;
    let unread_count = state.notifications.unread_count(&scope).await?;

    let last_page = if listed.total == 0 {
        1
    } else {
        (listed.total + per_page - 1) / per_page
    };

    Ok(Json(NotificationsPage {
        notifications: listed.notifications,
        pagination: PaginationMeta {
            current_page,
            last_page,
            per_page,
            total: listed.total,
        },
        unread_count,
    }))
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub message: String,
    pub notification: Notification,
}

/// PUT /api/v1/notifications/:id/read
///
/// Idempotent: re-marking an already-read row succeeds with `read_at`
/// unchanged. Rows outside the caller's scope are 403; unknown ids 404.
pub async fn mark_read(
    State(state): State<AppState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let notification = state.read_state.mark_read(id, &identity.scope()).await?;
    Ok(Json(MarkReadResponse {
        message: "Notification marked as read".to_string(),
        notification,
    }))
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub message: String,
    /// Rows that actually transitioned; zero when the inbox was already read.
    pub count: i64,
}

/// PUT /api/v1/notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    identity: CallerIdentity,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let count = state.read_state.mark_all_read(&identity.scope()).await?;
    Ok(Json(MarkAllReadResponse {
        message: "All notifications marked as read".to_string(),
        count,
    }))
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

/// GET /api/v1/notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    identity: CallerIdentity,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let unread_count = state.notifications.unread_count(&identity.scope()).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}
