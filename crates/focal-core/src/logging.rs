//! Structured logging schema and field name constants for focal.
//!
//! All crates use these constants for consistent structured logging fields.
//! This ensures log aggregation tools (Loki, Elasticsearch) can query by
//! standardized field names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-frame delivery, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across request → projection → delivery.
/// Format: UUIDv7 (time-ordered).
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "db", "delivery", "projector", "relay"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "registry", "bus", "queue", "pool", "distributor"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "append", "project", "publish", "mark_read"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Event log id (monotonic cursor) being operated on.
pub const EVENT_ID: &str = "event_id";

/// Namespaced event type ("inventory.low_stock").
pub const EVENT_TYPE: &str = "event_type";

/// Notification UUID being operated on.
pub const NOTIFICATION_ID: &str = "notification_id";

/// Live connection UUID.
pub const CONNECTION_ID: &str = "connection_id";

/// Authenticated user id.
pub const USER_ID: &str = "user_id";

/// Authenticated role ("staff", "admin", ...).
pub const ROLE: &str = "role";

/// Branch id the identity or event is pinned to.
pub const BRANCH_ID: &str = "branch_id";

/// Routing topic ("branch:5", "user:42").
pub const TOPIC: &str = "topic";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows returned by a query or projection.
pub const RESULT_COUNT: &str = "result_count";

/// Number of connections matched by a publish.
pub const MATCHED: &str = "matched";

/// Number of frames enqueued by a publish.
pub const ENQUEUED: &str = "enqueued";

/// Number of frames dropped (queue overflow) by a publish.
pub const DROPPED: &str = "dropped";

/// Live connection count.
pub const CONNECTIONS: &str = "connections";

/// Unread-count value pushed to a client.
pub const UNREAD_COUNT: &str = "unread_count";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

/// Database table or entity affected.
pub const DB_TABLE: &str = "db_table";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
