//! Centralized default constants for the focal notification core.
//!
//! **This module is the single source of truth** for all shared default
//! values. The API server and delivery crates reference these constants
//! instead of defining their own magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// EVENT LOG
// =============================================================================

/// Default page size for cursor reads of the event log.
pub const EVENT_PAGE_LIMIT: i64 = 100;

/// Maximum page size for cursor reads of the event log.
pub const EVENT_PAGE_LIMIT_MAX: i64 = 1000;

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Default page size for the notification feed.
pub const PER_PAGE: i64 = 20;

/// Maximum page size for the notification feed.
pub const PER_PAGE_MAX: i64 = 100;

/// Maximum notification title length in characters.
pub const TITLE_MAX_LENGTH: usize = 255;

/// Maximum notification message length in characters.
pub const MESSAGE_MAX_LENGTH: usize = 1000;

// =============================================================================
// DELIVERY
// =============================================================================

/// Default per-connection outbound queue capacity. On overflow the oldest
/// frame is dropped, so a stalled client converges on the newest state.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Broadcast capacity of the delivery firehose (relay and telemetry taps).
pub const FIREHOSE_CAPACITY: usize = 256;

/// WebSocket protocol ping interval in seconds.
pub const WS_PING_INTERVAL_SECS: u64 = 30;

/// SSE keep-alive comment interval in seconds.
pub const SSE_KEEPALIVE_SECS: u64 = 15;

/// Interval between periodic connection-stats log lines in seconds.
pub const STATS_INTERVAL_SECS: u64 = 60;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default rate limit: max requests per period.
pub const RATE_LIMIT_REQUESTS: u64 = 100;

/// Default rate limit: period in seconds.
pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;

/// Default CORS max-age in seconds (1 hour).
pub const CORS_MAX_AGE_SECS: u64 = 3600;

/// Maximum request body size in bytes (1 MB; event payloads are small JSON).
pub const MAX_BODY_SIZE_BYTES: usize = 1024 * 1024;

// =============================================================================
// RELAY
// =============================================================================

/// HTTP timeout for forwarding frames to an external relay, in seconds.
pub const RELAY_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// DELIVERY CONFIGURATION
// =============================================================================

/// Tunables for the live-delivery layer.
///
/// Read from environment variables at server start; defaults suit a
/// single-process deployment.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Per-connection outbound queue capacity.
    pub queue_capacity: usize,
    /// Firehose broadcast capacity.
    pub firehose_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: OUTBOUND_QUEUE_CAPACITY,
            firehose_capacity: FIREHOSE_CAPACITY,
        }
    }
}

impl DeliveryConfig {
    /// Load configuration from environment variables with fallback to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("QUEUE_CAPACITY") {
            if let Ok(capacity) = val.parse::<usize>() {
                config.queue_capacity = capacity.clamp(8, 4096);
            } else {
                tracing::warn!(value = %val, "Invalid QUEUE_CAPACITY, using default");
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_limits_ordered() {
        // Use const block to satisfy clippy::assertions_on_constants
        const {
            assert!(PER_PAGE < PER_PAGE_MAX);
            assert!(EVENT_PAGE_LIMIT < EVENT_PAGE_LIMIT_MAX);
            assert!(PER_PAGE_MAX <= EVENT_PAGE_LIMIT_MAX);
        }
    }

    #[test]
    fn content_limits_ordered() {
        const {
            assert!(TITLE_MAX_LENGTH < MESSAGE_MAX_LENGTH);
        }
    }

    #[test]
    fn delivery_config_defaults() {
        let config = DeliveryConfig::default();
        assert_eq!(config.queue_capacity, OUTBOUND_QUEUE_CAPACITY);
        assert_eq!(config.firehose_capacity, FIREHOSE_CAPACITY);
    }

    #[test]
    fn keepalive_faster_than_ping() {
        const {
            assert!(SSE_KEEPALIVE_SECS < WS_PING_INTERVAL_SECS);
        }
    }
}
