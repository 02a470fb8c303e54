//! focal API server.
//!
//! HTTP surface over the event distribution core: collaborator event
//! intake, the notification inbox, and live delivery over WebSocket and
//! SSE. Identity arrives from the upstream auth gateway as headers; this
//! process owns routing, fan-out, and read state, nothing else.

mod error;
mod handlers;
mod identity;
mod relay;
mod telemetry;

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use governor::{Quota, RateLimiter};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use utoipa::OpenApi;
use utoipa_swagger_ui::{Config, SwaggerUi};
use uuid::Uuid;

use focal_core::defaults::{
    self, DeliveryConfig, RATE_LIMIT_PERIOD_SECS, RATE_LIMIT_REQUESTS, STATS_INTERVAL_SECS,
};
use focal_core::NotificationRepository;
use focal_db::{Database, PoolConfig};
use focal_realtime::{DeliveryBus, Distributor, ReadStateTracker, SubscriptionRegistry};

use crate::error::ApiError;
use crate::handlers::{events, notifications, sse, system, ws};
use crate::relay::RelayConfig;

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
///
/// UUIDv7 embeds a Unix timestamp, so IDs sort chronologically — useful for
/// log correlation and debugging production incidents.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Global rate limiter type (direct quota, no keyed bucketing).
type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Event intake: append, project, publish.
    pub distributor: Arc<Distributor>,
    /// Notification rows and read-state queries.
    pub notifications: Arc<dyn NotificationRepository>,
    /// Read-state mutations with badge refresh.
    pub read_state: Arc<ReadStateTracker>,
    /// Live fan-out over the connection registry.
    pub bus: DeliveryBus,
    /// Global rate limiter (None if rate limiting is disabled).
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
    /// Externally visible base URL, used in served specs.
    pub public_url: String,
    /// Process start, for the health uptime field.
    pub started_at: Instant,
}

/// OpenAPI documentation (utoipa metadata, used for Swagger UI configuration).
///
/// The comprehensive OpenAPI spec is maintained in `openapi.yaml` and served
/// at `/openapi.yaml`. Swagger UI at `/docs` fetches from that endpoint.
#[allow(dead_code)]
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Focal API",
        version = "2026.2.4",
        description = "Branch-scoped real-time notification and event distribution core"
    ),
    tags(
        (name = "Events", description = "Collaborator event intake and replay"),
        (name = "Notifications", description = "Per-identity notification inbox"),
        (name = "Delivery", description = "WebSocket and SSE live delivery"),
        (name = "System", description = "Health and operational views"),
    )
)]
struct ApiDoc;

/// Serve OpenAPI YAML spec
async fn openapi_yaml() -> impl IntoResponse {
    const SPEC: &str = include_str!("openapi.yaml");
    ([(header::CONTENT_TYPE, "application/yaml")], SPEC)
}

/// Serve the AsyncAPI spec for the streaming surface.
async fn asyncapi_yaml(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let spec = focal_core::build_asyncapi_spec(env!("CARGO_PKG_VERSION"), &state.public_url);
    let yaml = serde_yaml::to_string(&spec)
        .map_err(|e| ApiError::Internal(format!("AsyncAPI serialization failed: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "application/yaml")], yaml))
}

// =============================================================================
// CORS CONFIGURATION HELPER
// =============================================================================

/// Parse allowed origins from the `ALLOWED_ORIGINS` environment variable.
///
/// Strict origin whitelisting: no wildcard origins, invalid entries are
/// dropped with a warning. Defaults cover local development.
fn parse_allowed_origins() -> Vec<HeaderValue> {
    let origins_str = std::env::var("ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string());

    if origins_str.trim().is_empty() {
        return vec![
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://localhost:5173"),
        ];
    }

    origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "focal_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "focal_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("focal-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(non_blocking);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            } else {
                layer = layer.with_ansi(false); // no ANSI in files
            }
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    // Get configuration from environment
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/focal".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| defaults::SERVER_PORT.to_string())
        .parse()
        .unwrap_or(defaults::SERVER_PORT);

    // Rate limiting configuration
    // RATE_LIMIT_REQUESTS: requests per period (default: 100)
    // RATE_LIMIT_PERIOD_SECS: period in seconds (default: 60 = 1 minute)
    let rate_limit_requests: u64 = std::env::var("RATE_LIMIT_REQUESTS")
        .unwrap_or_else(|_| RATE_LIMIT_REQUESTS.to_string())
        .parse()
        .unwrap_or(RATE_LIMIT_REQUESTS);
    let rate_limit_period_secs: u64 = std::env::var("RATE_LIMIT_PERIOD_SECS")
        .unwrap_or_else(|_| RATE_LIMIT_PERIOD_SECS.to_string())
        .parse()
        .unwrap_or(RATE_LIMIT_PERIOD_SECS);
    let rate_limit_enabled: bool = std::env::var("RATE_LIMIT_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    info!(
        "Rate limiting: {} ({} requests per {} seconds)",
        if rate_limit_enabled {
            "enabled"
        } else {
            "disabled"
        },
        rate_limit_requests,
        rate_limit_period_secs
    );

    // Connect to database
    let max_connections: u32 = std::env::var("DATABASE_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(focal_db::pool::DEFAULT_MAX_CONNECTIONS);
    info!("Connecting to database...");
    let db = Database::connect_with_config(
        &database_url,
        PoolConfig::new().max_connections(max_connections),
    )
    .await?;
    info!("Database connected");

    // Run pending database migrations on startup
    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    // Wire the delivery core: registry → bus → distributor / read state
    let delivery = DeliveryConfig::from_env();
    let registry = Arc::new(SubscriptionRegistry::new(delivery.queue_capacity));
    let bus = DeliveryBus::with_firehose_capacity(registry.clone(), delivery.firehose_capacity);
    let distributor = Arc::new(Distributor::from_db(&db, bus.clone()));
    let read_state = Arc::new(ReadStateTracker::from_db(&db, bus.clone()));
    let notifications: Arc<dyn NotificationRepository> = Arc::new(db.notifications.clone());
    info!(
        queue_capacity = delivery.queue_capacity,
        firehose_capacity = delivery.firehose_capacity,
        "Delivery core initialized"
    );

    // Spawn outbound relay when configured
    if let Some(relay_config) = RelayConfig::from_env() {
        let relay_bus = bus.clone();
        tokio::spawn(async move {
            relay::relay_dispatcher(relay_bus, relay_config).await;
        });
    } else {
        info!("No RELAY_URL configured, relay dispatcher disabled");
    }

    // Spawn telemetry mirror
    let tm_bus = bus.clone();
    tokio::spawn(async move {
        telemetry::telemetry_mirror(tm_bus).await;
    });

    // Spawn periodic connection stats
    let stats_registry = registry.clone();
    tokio::spawn(async move {
        connection_stats(stats_registry).await;
    });

    // Externally visible base URL (served specs reference it)
    let public_url =
        std::env::var("PUBLIC_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

    // Create rate limiter if enabled
    let rate_limiter = if rate_limit_enabled {
        let quota = Quota::with_period(std::time::Duration::from_secs(rate_limit_period_secs))
            .expect("Rate limit period must be non-zero")
            .allow_burst(
                NonZeroU32::new(rate_limit_requests as u32).expect("Rate limit must be non-zero"),
            );
        Some(Arc::new(RateLimiter::direct(quota)))
    } else {
        None
    };

    // Create app state
    let state = AppState {
        distributor,
        notifications,
        read_state,
        bus: bus.clone(),
        rate_limiter,
        public_url,
        started_at: Instant::now(),
    };

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(system::health_check))
        // OpenAPI / Swagger UI
        .merge(
            SwaggerUi::new("/docs").config(
                Config::new(["/openapi.yaml"])
                    .try_it_out_enabled(true)
                    .filter(true)
                    .display_request_duration(true),
            ),
        )
        .route("/openapi.yaml", get(openapi_yaml))
        .route("/asyncapi.yaml", get(asyncapi_yaml))
        // Event intake and replay
        .route(
            "/api/v1/events",
            post(events::ingest_event).get(events::list_events),
        )
        // SSE delivery
        .route("/api/v1/events/stream", get(sse::sse_stream))
        // Notification inbox
        .route(
            "/api/v1/notifications",
            get(notifications::list_notifications),
        )
        .route(
            "/api/v1/notifications/read-all",
            put(notifications::mark_all_read),
        )
        .route(
            "/api/v1/notifications/unread-count",
            get(notifications::unread_count),
        )
        .route("/api/v1/notifications/:id/read", put(notifications::mark_read))
        // WebSocket delivery
        .route("/api/v1/ws", get(ws::ws_handler))
        // Ops view of live connections
        .route("/api/v1/connections", get(system::list_connections))
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer({
            let allowed_origins = parse_allowed_origins();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(allowed_origins))
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::HeaderName::from_static(identity::USER_ID_HEADER),
                    header::HeaderName::from_static(identity::ROLE_HEADER),
                    header::HeaderName::from_static(identity::BRANCH_ID_HEADER),
                ])
                .allow_credentials(true)
                .max_age(std::time::Duration::from_secs(defaults::CORS_MAX_AGE_SECS))
        })
        .layer(RequestBodyLimitLayer::new(defaults::MAX_BODY_SIZE_BYTES))
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry, bus))
        .await?;

    info!("Server stopped");
    Ok(())
}

// =============================================================================
// BACKGROUND TASKS
// =============================================================================

/// Log connection/queue/drop counts every minute; quiet when idle.
async fn connection_stats(registry: Arc<SubscriptionRegistry>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(STATS_INTERVAL_SECS));
    loop {
        interval.tick().await;
        let snapshot = registry.snapshot();
        if snapshot.is_empty() {
            continue;
        }
        let queued: usize = snapshot.iter().map(|h| h.queue.len()).sum();
        let dropped: u64 = snapshot.iter().map(|h| h.queue.dropped()).sum();
        info!(
            connections = snapshot.len(),
            queued, dropped, "Connection stats"
        );
    }
}

/// Wait for SIGINT/SIGTERM, then announce and drain the live registry.
///
/// Draining closes every outbound queue after its backlog, so consumer
/// tasks deliver the shutdown broadcast and terminate on their own.
async fn shutdown_signal(registry: Arc<SubscriptionRegistry>, bus: DeliveryBus) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
    bus.publish_system("Server shutting down");
    let drained = registry.drain();
    info!(connections = drained.len(), "Connection registry drained");
}

// =============================================================================
// RATE LIMITING MIDDLEWARE
// =============================================================================

async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    // If rate limiting is disabled, pass through
    if let Some(limiter) = &state.rate_limiter {
        // Check rate limit
        if limiter.check().is_err() {
            tracing::warn!("Rate limit exceeded");
            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "rate_limit_exceeded",
                    "error_description": "Too many requests. Please wait before retrying."
                })),
            ));
        }
    }
    Ok(next.run(request).await)
}
