//! HTTP and streaming handlers for focal-api.

pub mod events;
pub mod notifications;
pub mod sse;
pub mod system;
pub mod ws;
