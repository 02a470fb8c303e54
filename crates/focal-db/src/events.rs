//! Event log repository implementation.
//!
//! The `events` table is append-only: rows are inserted with a BIGSERIAL id
//! that doubles as the replay cursor, and no update or delete statements
//! exist anywhere in this module.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use focal_core::{defaults, Error, Event, EventRepository, NewEvent, Result};

const EVENT_COLUMNS: &str =
    "id, event_type, occurred_at, branch_id, actor_user_id, payload, created_at";

/// PostgreSQL implementation of EventRepository.
#[derive(Clone)]
pub struct PgEventRepository {
    pool: Pool<Postgres>,
}

impl PgEventRepository {
    /// Create a new PgEventRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse an event row into an Event struct.
    fn parse_event_row(row: sqlx::postgres::PgRow) -> Result<Event> {
        let type_str: String = row.get("event_type");
        Ok(Event {
            id: row.get("id"),
            event_type: type_str.parse()?,
            occurred_at: row.get("occurred_at"),
            branch_id: row.get("branch_id"),
            actor_user_id: row.get("actor_user_id"),
            payload: row.get("payload"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn append(&self, event: NewEvent) -> Result<Event> {
        event.validate()?;

        let row = sqlx::query(&format!(
            "INSERT INTO events (event_type, occurred_at, branch_id, actor_user_id, payload)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(event.event_type.as_str())
        .bind(event.occurred_at)
        .bind(event.branch_id)
        .bind(event.actor_user_id)
        .bind(&event.payload)
        .fetch_one(&self.pool)
        .await?;

        let stored = Self::parse_event_row(row)?;

        debug!(
            subsystem = "db",
            component = "events",
            op = "append",
            event_id = stored.id,
            event_type = %stored.event_type,
            branch_id = ?stored.branch_id,
            "Event appended"
        );
        Ok(stored)
    }

    async fn read_since(&self, cursor: i64, limit: i64) -> Result<Vec<Event>> {
        let limit = limit.clamp(1, defaults::EVENT_PAGE_LIMIT_MAX);

        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE id > $1
             ORDER BY id ASC
             LIMIT $2"
        ))
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::parse_event_row).collect()
    }

    async fn get(&self, id: i64) -> Result<Event> {
        let row = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("event {}", id)))?;

        Self::parse_event_row(row)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
