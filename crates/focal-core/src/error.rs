//! Error types for focal.

use thiserror::Error;

/// Result type alias using focal's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for focal operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input rejected before any state change
    #[error("Validation error: {0}")]
    Validation(String),

    /// Event type has no routing entry (or its payload does not match the
    /// type's schema). The event is still stored; it just notifies nobody.
    #[error("Unroutable event: {event_type}")]
    UnroutableEvent { event_type: String },

    /// Caller attempted to mutate a notification it does not own
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// `subscribe` called twice for the same connection id
    #[error("Duplicate connection: {connection_id}")]
    DuplicateConnection { connection_id: uuid::Uuid },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Whether the error leaves stored state intact and the caller can
    /// safely continue (as opposed to a persistence failure).
    pub fn is_non_fatal(&self) -> bool {
        matches!(self, Error::UnroutableEvent { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("notification 42".to_string());
        assert_eq!(err.to_string(), "Not found: notification 42");
    }

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("occurred_at is required".to_string());
        assert_eq!(err.to_string(), "Validation error: occurred_at is required");
    }

    #[test]
    fn test_error_display_unroutable_event() {
        let err = Error::UnroutableEvent {
            event_type: "transfer.completed".to_string(),
        };
        assert_eq!(err.to_string(), "Unroutable event: transfer.completed");
    }

    #[test]
    fn test_error_display_unauthorized() {
        let err = Error::Unauthorized("notification belongs to another user".to_string());
        assert_eq!(
            err.to_string(),
            "Unauthorized: notification belongs to another user"
        );
    }

    #[test]
    fn test_error_display_duplicate_connection() {
        let id = Uuid::nil();
        let err = Error::DuplicateConnection { connection_id: id };
        assert_eq!(err.to_string(), format!("Duplicate connection: {}", id));
    }

    #[test]
    fn test_error_display_serialization() {
        let err = Error::Serialization("invalid JSON".to_string());
        assert_eq!(err.to_string(), "Serialization error: invalid JSON");
    }

    #[test]
    fn test_error_display_internal() {
        let err = Error::Internal("unexpected state".to_string());
        assert_eq!(err.to_string(), "Internal error: unexpected state");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_unroutable_is_non_fatal() {
        let err = Error::UnroutableEvent {
            event_type: "transfer.completed".to_string(),
        };
        assert!(err.is_non_fatal());
        assert!(!Error::Internal("x".to_string()).is_non_fatal());
        assert!(!Error::Validation("x".to_string()).is_non_fatal());
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(get_result().unwrap(), 42);
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_error_debug_format() {
        let err = Error::NotFound("test".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("NotFound"));
    }
}
