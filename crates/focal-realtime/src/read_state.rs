//! Read-state transitions with unread-badge signaling.
//!
//! Wraps the notification repository's mark operations and pushes an
//! `unread_count` frame to the caller's private channel, but only when a
//! row actually transitioned. Idempotent re-marks and unauthorized
//! attempts leave the badge untouched.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use focal_core::{Notification, NotificationRepository, RecipientScope, Result};
use focal_db::Database;

use crate::bus::DeliveryBus;

pub struct ReadStateTracker {
    notifications: Arc<dyn NotificationRepository>,
    bus: DeliveryBus,
}

impl ReadStateTracker {
    pub fn new(notifications: Arc<dyn NotificationRepository>, bus: DeliveryBus) -> Self {
        Self { notifications, bus }
    }

    /// Wire against the PostgreSQL repositories.
    pub fn from_db(db: &Database, bus: DeliveryBus) -> Self {
        Self::new(Arc::new(db.notifications.clone()), bus)
    }

    /// Mark one notification read for the caller.
    ///
    /// `unread → read` is terminal; a second call is a no-op success with
    /// `read_at` unchanged. The caller's badge is refreshed only on the
    /// actual transition.
    pub async fn mark_read(&self, id: Uuid, scope: &RecipientScope) -> Result<Notification> {
        let outcome = self.notifications.mark_read(id, scope).await?;
        if outcome.updated {
            self.refresh_badge(scope).await?;
        }
        Ok(outcome.notification)
    }

    /// Mark every unread notification visible to the caller as read.
    /// Returns the number of rows that transitioned.
    pub async fn mark_all_read(&self, scope: &RecipientScope) -> Result<i64> {
        let affected = self.notifications.mark_all_read(scope).await?;
        if affected > 0 {
            self.refresh_badge(scope).await?;
        }
        Ok(affected)
    }

    async fn refresh_badge(&self, scope: &RecipientScope) -> Result<()> {
        let count = self.notifications.unread_count(scope).await?;
        let report = self.bus.publish_unread_count(scope.user_id, count);
        debug!(
            subsystem = "delivery",
            component = "read_state",
            op = "badge.refresh",
            user_id = scope.user_id,
            unread_count = count,
            matched = report.matched,
            "Unread badge refreshed"
        );
        Ok(())
    }
}
