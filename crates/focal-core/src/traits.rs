//! Storage traits for the notification core.
//!
//! These traits define the interfaces the Postgres layer must satisfy,
//! enabling in-memory doubles for the projection and delivery tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;
use crate::error::Result;
use crate::models::{
    Event, NewEvent, NewNotification, Notification, NotificationKind, NotificationStatus, Role,
};

// =============================================================================
// RECIPIENT SCOPE
// =============================================================================

/// The authenticated identity a read or mutation runs under.
///
/// Determines which rows are visible: rows addressed to the user, plus
/// role-audience rows matching the role (and branch, when the row is
/// branch-scoped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientScope {
    pub user_id: i64,
    pub role: Role,
    pub branch_id: Option<i64>,
}

impl RecipientScope {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self {
            user_id,
            role,
            branch_id: None,
        }
    }

    pub fn with_branch(mut self, branch_id: i64) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    /// Whether this identity may read or mark the given row.
    pub fn can_access(&self, notification: &Notification) -> bool {
        notification.visible_to(self.user_id, self.role, self.branch_id)
    }
}

// =============================================================================
// EVENT REPOSITORY
// =============================================================================

/// Repository for the append-only event log.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Append one event. The write is durable before this returns; the
    /// stored row carries the assigned monotonic id.
    async fn append(&self, event: NewEvent) -> Result<Event>;

    /// Read events with id strictly greater than `cursor`, ascending,
    /// at most `limit` rows. Restartable from any cursor.
    async fn read_since(&self, cursor: i64, limit: i64) -> Result<Vec<Event>>;

    /// Fetch one event by id.
    async fn get(&self, id: i64) -> Result<Event>;

    /// Total number of stored events.
    async fn count(&self) -> Result<i64>;
}

// =============================================================================
// NOTIFICATION REPOSITORY
// =============================================================================

/// Request for listing notifications visible to a recipient.
#[derive(Debug, Clone, Default)]
pub struct ListNotificationsRequest {
    /// Filter by read state.
    pub status: Option<NotificationStatus>,
    /// Filter by category.
    pub kind: Option<NotificationKind>,
    /// 1-based page number.
    pub page: Option<i64>,
    /// Page size, clamped to the configured maximum.
    pub per_page: Option<i64>,
}

impl ListNotificationsRequest {
    /// Effective page, at least 1.
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Effective page size, clamped to `1..=PER_PAGE_MAX`.
    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(defaults::PER_PAGE)
            .clamp(1, defaults::PER_PAGE_MAX)
    }

    /// Row offset for the effective page.
    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.per_page()
    }
}

/// Response for listing notifications: one page plus the total match count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListNotificationsResponse {
    pub notifications: Vec<Notification>,
    pub total: i64,
}

/// Result of a uniqueness-checked insert.
#[derive(Debug, Clone)]
pub struct InsertedNotification {
    pub notification: Notification,
    /// False when an existing row for the same (event, recipient) was
    /// returned instead of inserting.
    pub created: bool,
}

/// Result of a mark-read mutation.
#[derive(Debug, Clone)]
pub struct MarkReadOutcome {
    pub notification: Notification,
    /// False when the row was already read (no state changed).
    pub updated: bool,
}

/// Repository for notification rows and their read state.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert a projected row unless one already exists for the same
    /// (event, recipient); returns the surviving row either way.
    async fn insert_unique(&self, draft: NewNotification) -> Result<InsertedNotification>;

    /// Fetch one notification by id.
    async fn get(&self, id: Uuid) -> Result<Notification>;

    /// List rows visible to the scope, newest first, paginated.
    async fn list(
        &self,
        scope: &RecipientScope,
        req: ListNotificationsRequest,
    ) -> Result<ListNotificationsResponse>;

    /// Count unread rows visible to the scope.
    async fn unread_count(&self, scope: &RecipientScope) -> Result<i64>;

    /// Mark one row read. Authorization follows the scope's visibility;
    /// marking an already-read row is a no-op, not an error.
    async fn mark_read(&self, id: Uuid, scope: &RecipientScope) -> Result<MarkReadOutcome>;

    /// Mark every unread row visible to the scope as read, atomically.
    /// Returns the number of rows that transitioned.
    async fn mark_all_read(&self, scope: &RecipientScope) -> Result<i64>;
}
