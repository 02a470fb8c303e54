//! # focal-db
//!
//! PostgreSQL storage layer for the focal notification core.
//!
//! This crate provides:
//! - Connection pool management
//! - The append-only event log repository
//! - The notification repository with recipient-scoped visibility
//!
//! ## Example
//!
//! ```rust,ignore
//! use focal_db::Database;
//! use focal_core::{EventType, NewEvent};
//! use chrono::Utc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/focal").await?;
//!
//!     let event = db
//!         .events
//!         .append(NewEvent::new(EventType::UserSignup, Utc::now()))
//!         .await?;
//!
//!     println!("Appended event: {}", event.id);
//!     Ok(())
//! }
//! ```

pub mod events;
pub mod notifications;
pub mod pool;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use focal_core::*;

// Re-export repository implementations
pub use events::PgEventRepository;
pub use notifications::PgNotificationRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Append-only event log.
    pub events: PgEventRepository,
    /// Notification rows and read state.
    pub notifications: PgNotificationRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            events: PgEventRepository::new(pool.clone()),
            notifications: PgNotificationRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
