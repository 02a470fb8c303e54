//! Notification repository implementation.
//!
//! Rows are addressed either to a single user (`recipient_user_id` set) or
//! to a role audience (`recipient_user_id` NULL, optionally branch-scoped).
//! Partial unique indexes on (event_id, recipient_user_id) and
//! (event_id, recipient_role) back the projector's idempotence guarantee.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use focal_core::{
    Error, InsertedNotification, ListNotificationsRequest, ListNotificationsResponse,
    MarkReadOutcome, NewNotification, Notification, NotificationRepository, RecipientScope, Result,
};

const NOTIFICATION_COLUMNS: &str = "id, event_id, recipient_user_id, recipient_role, branch_id, \
     kind, title, message, data, status, created_at, read_at";

/// Visibility predicate for a caller scope, using bind slots $1 (user id),
/// $2 (role), $3 (branch id, nullable). Role-audience rows match on role,
/// and on branch too when the row is branch-scoped.
const VISIBILITY_PREDICATE: &str = "(recipient_user_id = $1
      OR (recipient_user_id IS NULL
          AND recipient_role = $2
          AND (branch_id IS NULL OR branch_id = $3)))";

/// PostgreSQL implementation of NotificationRepository.
#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: Pool<Postgres>,
}

impl PgNotificationRepository {
    /// Create a new PgNotificationRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse a notification row into a Notification struct.
    fn parse_notification_row(row: sqlx::postgres::PgRow) -> Result<Notification> {
        let role: String = row.get("recipient_role");
        let kind: String = row.get("kind");
        let status: String = row.get("status");
        Ok(Notification {
            id: row.get("id"),
            event_id: row.get("event_id"),
            recipient_user_id: row.get("recipient_user_id"),
            recipient_role: role.parse()?,
            branch_id: row.get("branch_id"),
            kind: kind.parse()?,
            title: row.get("title"),
            message: row.get("message"),
            data: row.get("data"),
            status: status.parse()?,
            created_at: row.get("created_at"),
            read_at: row.get("read_at"),
        })
    }

    /// Fetch the surviving row for a draft's (event, recipient) key.
    async fn fetch_existing(&self, draft: &NewNotification) -> Result<Notification> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE event_id = $1
               AND (($2::bigint IS NOT NULL AND recipient_user_id = $2)
                 OR ($2::bigint IS NULL AND recipient_user_id IS NULL AND recipient_role = $3))"
        ))
        .bind(draft.event_id)
        .bind(draft.recipient_user_id)
        .bind(draft.recipient_role.as_str())
        .fetch_one(&self.pool)
        .await?;

        Self::parse_notification_row(row)
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn insert_unique(&self, draft: NewNotification) -> Result<InsertedNotification> {
        let id = Uuid::now_v7();

        // Atomic check-and-insert using INSERT ... WHERE NOT EXISTS so replays
        // of the same event return the existing row instead of erroring. The
        // partial unique indexes close the remaining race window; a concurrent
        // loser surfaces as a unique violation and falls through to the select.
        let inserted = sqlx::query(&format!(
            "INSERT INTO notifications
                 (id, event_id, recipient_user_id, recipient_role, branch_id,
                  kind, title, message, data)
             SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9
             WHERE NOT EXISTS (
                 SELECT 1 FROM notifications
                 WHERE event_id = $2
                   AND (($3::bigint IS NOT NULL AND recipient_user_id = $3)
                     OR ($3::bigint IS NULL AND recipient_user_id IS NULL
                         AND recipient_role = $4))
             )
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(id)
        .bind(draft.event_id)
        .bind(draft.recipient_user_id)
        .bind(draft.recipient_role.as_str())
        .bind(draft.branch_id)
        .bind(draft.kind.as_str())
        .bind(&draft.title)
        .bind(&draft.message)
        .bind(&draft.data)
        .fetch_optional(&self.pool)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                None
            }
            Err(e) => return Err(e.into()),
        };

        match row {
            Some(row) => {
                let notification = Self::parse_notification_row(row)?;
                debug!(
                    subsystem = "db",
                    component = "notifications",
                    op = "insert_unique",
                    notification_id = %notification.id,
                    event_id = notification.event_id,
                    role = notification.recipient_role.as_str(),
                    user_id = ?notification.recipient_user_id,
                    "Notification inserted"
                );
                Ok(InsertedNotification {
                    notification,
                    created: true,
                })
            }
            None => {
                let notification = self.fetch_existing(&draft).await?;
                debug!(
                    subsystem = "db",
                    component = "notifications",
                    op = "insert_unique",
                    notification_id = %notification.id,
                    event_id = notification.event_id,
                    "Duplicate projection, returning existing row"
                );
                Ok(InsertedNotification {
                    notification,
                    created: false,
                })
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Notification> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("notification {}", id)))?;

        Self::parse_notification_row(row)
    }

    async fn list(
        &self,
        scope: &RecipientScope,
        req: ListNotificationsRequest,
    ) -> Result<ListNotificationsResponse> {
        let status = req.status.map(|s| s.as_str());
        let kind = req.kind.map(|k| k.as_str());

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM notifications
             WHERE {VISIBILITY_PREDICATE}
               AND ($4::text IS NULL OR status = $4)
               AND ($5::text IS NULL OR kind = $5)"
        ))
        .bind(scope.user_id)
        .bind(scope.role.as_str())
        .bind(scope.branch_id)
        .bind(status)
        .bind(kind)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE {VISIBILITY_PREDICATE}
               AND ($4::text IS NULL OR status = $4)
               AND ($5::text IS NULL OR kind = $5)
             ORDER BY created_at DESC, id DESC
             LIMIT $6 OFFSET $7"
        ))
        .bind(scope.user_id)
        .bind(scope.role.as_str())
        .bind(scope.branch_id)
        .bind(status)
        .bind(kind)
        .bind(req.per_page())
        .bind(req.offset())
        .fetch_all(&self.pool)
        .await?;

        let notifications = rows
            .into_iter()
            .map(Self::parse_notification_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(ListNotificationsResponse {
            notifications,
            total,
        })
    }

    async fn unread_count(&self, scope: &RecipientScope) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM notifications
             WHERE {VISIBILITY_PREDICATE} AND status = 'unread'"
        ))
        .bind(scope.user_id)
        .bind(scope.role.as_str())
        .bind(scope.branch_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn mark_read(&self, id: Uuid, scope: &RecipientScope) -> Result<MarkReadOutcome> {
        let existing = self.get(id).await?;

        if !scope.can_access(&existing) {
            return Err(Error::Unauthorized(format!(
                "notification {} is not addressed to user {}",
                id, scope.user_id
            )));
        }

        if existing.is_read() {
            return Ok(MarkReadOutcome {
                notification: existing,
                updated: false,
            });
        }

        let updated = sqlx::query(&format!(
            "UPDATE notifications
             SET status = 'read', read_at = now()
             WHERE id = $1 AND status = 'unread'
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let outcome = match updated {
            Some(row) => MarkReadOutcome {
                notification: Self::parse_notification_row(row)?,
                updated: true,
            },
            // Lost a race with another marker; the row is already terminal.
            None => MarkReadOutcome {
                notification: self.get(id).await?,
                updated: false,
            },
        };

        debug!(
            subsystem = "db",
            component = "notifications",
            op = "mark_read",
            notification_id = %id,
            user_id = scope.user_id,
            success = outcome.updated,
            "Notification marked read"
        );
        Ok(outcome)
    }

    async fn mark_all_read(&self, scope: &RecipientScope) -> Result<i64> {
        let result = sqlx::query(&format!(
            "UPDATE notifications
             SET status = 'read', read_at = now()
             WHERE status = 'unread' AND {VISIBILITY_PREDICATE}"
        ))
        .bind(scope.user_id)
        .bind(scope.role.as_str())
        .bind(scope.branch_id)
        .execute(&self.pool)
        .await?;

        let affected = result.rows_affected() as i64;
        debug!(
            subsystem = "db",
            component = "notifications",
            op = "mark_all_read",
            user_id = scope.user_id,
            result_count = affected,
            "Marked all visible notifications read"
        );
        Ok(affected)
    }
}
