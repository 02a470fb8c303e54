//! # focal-core
//!
//! Core types, traits, and abstractions for the focal notification core.
//!
//! This crate provides the domain vocabulary (events, notifications, roles,
//! topics), the storage traits, and the shared constants that the other
//! focal crates depend on.

pub mod asyncapi;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod topic;
pub mod traits;

// Re-export commonly used types at crate root
pub use asyncapi::build_asyncapi_spec;
pub use error::{Error, Result};
pub use models::*;
pub use topic::{topics_for, Topic};
pub use traits::*;
