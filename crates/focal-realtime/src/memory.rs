//! In-memory repository adapters.
//!
//! Implement the same contracts as the PostgreSQL repositories in
//! `focal-db`, backed by plain vectors. Used by the projection and
//! delivery tests, and by API tests that run without a database.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use focal_core::defaults::EVENT_PAGE_LIMIT_MAX;
use focal_core::{
    Error, Event, EventRepository, InsertedNotification, ListNotificationsRequest,
    ListNotificationsResponse, MarkReadOutcome, NewEvent, NewNotification, Notification,
    NotificationRepository, NotificationStatus, RecipientScope, Result,
};

/// Vector-backed event log with sequential ids.
#[derive(Clone, Default)]
pub struct MemoryEventRepository {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventRepository for MemoryEventRepository {
    async fn append(&self, event: NewEvent) -> Result<Event> {
        event.validate()?;

        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = Event {
            id: events.len() as i64 + 1,
            event_type: event.event_type,
            occurred_at: event.occurred_at,
            branch_id: event.branch_id,
            actor_user_id: event.actor_user_id,
            payload: event.payload,
            created_at: Utc::now(),
        };
        events.push(stored.clone());
        Ok(stored)
    }

    async fn read_since(&self, cursor: i64, limit: i64) -> Result<Vec<Event>> {
        let limit = limit.clamp(1, EVENT_PAGE_LIMIT_MAX) as usize;
        Ok(self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| event.id > cursor)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> Result<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|event| event.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("event {}", id)))
    }

    async fn count(&self) -> Result<i64> {
        Ok(self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as i64)
    }
}

/// Vector-backed notification store with the projector's dedup rule.
#[derive(Clone, Default)]
pub struct MemoryNotificationRepository {
    rows: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn same_recipient(row: &Notification, draft: &NewNotification) -> bool {
        row.event_id == draft.event_id
            && match draft.recipient_user_id {
                Some(user_id) => row.recipient_user_id == Some(user_id),
                None => {
                    row.recipient_user_id.is_none() && row.recipient_role == draft.recipient_role
                }
            }
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotificationRepository {
    async fn insert_unique(&self, draft: NewNotification) -> Result<InsertedNotification> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = rows.iter().find(|row| Self::same_recipient(row, &draft)) {
            return Ok(InsertedNotification {
                notification: existing.clone(),
                created: false,
            });
        }

        let notification = Notification {
            id: Uuid::now_v7(),
            event_id: draft.event_id,
            recipient_user_id: draft.recipient_user_id,
            recipient_role: draft.recipient_role,
            branch_id: draft.branch_id,
            kind: draft.kind,
            title: draft.title,
            message: draft.message,
            data: draft.data,
            status: NotificationStatus::Unread,
            created_at: Utc::now(),
            read_at: None,
        };
        rows.push(notification.clone());
        Ok(InsertedNotification {
            notification,
            created: true,
        })
    }

    async fn get(&self, id: Uuid) -> Result<Notification> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|row| row.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("notification {}", id)))
    }

    async fn list(
        &self,
        scope: &RecipientScope,
        req: ListNotificationsRequest,
    ) -> Result<ListNotificationsResponse> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);

        let mut visible: Vec<Notification> = rows
            .iter()
            .filter(|row| scope.can_access(row))
            .filter(|row| req.status.map_or(true, |status| row.status == status))
            .filter(|row| req.kind.map_or(true, |kind| row.kind == kind))
            .cloned()
            .collect();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = visible.len() as i64;
        let notifications = visible
            .into_iter()
            .skip(req.offset() as usize)
            .take(req.per_page() as usize)
            .collect();

        Ok(ListNotificationsResponse {
            notifications,
            total,
        })
    }

    async fn unread_count(&self, scope: &RecipientScope) -> Result<i64> {
        Ok(self
            .rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|row| scope.can_access(row) && row.status == NotificationStatus::Unread)
            .count() as i64)
    }

    async fn mark_read(&self, id: Uuid, scope: &RecipientScope) -> Result<MarkReadOutcome> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| Error::NotFound(format!("notification {}", id)))?;

        if !scope.can_access(row) {
            return Err(Error::Unauthorized(format!(
                "notification {} is not addressed to user {}",
                id, scope.user_id
            )));
        }

        if row.is_read() {
            return Ok(MarkReadOutcome {
                notification: row.clone(),
                updated: false,
            });
        }

        row.status = NotificationStatus::Read;
        row.read_at = Some(Utc::now());
        Ok(MarkReadOutcome {
            notification: row.clone(),
            updated: true,
        })
    }

    async fn mark_all_read(&self, scope: &RecipientScope) -> Result<i64> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let mut affected = 0;

        for row in rows.iter_mut() {
            if scope.can_access(row) && row.status == NotificationStatus::Unread {
                row.status = NotificationStatus::Read;
                row.read_at = Some(now);
                affected += 1;
            }
        }
        Ok(affected)
    }
}
