//! # focal-realtime
//!
//! Projection and live delivery engine for focal.
//!
//! This crate provides:
//! - The event routing table and idempotent notification projector
//! - Per-connection bounded outbound queues with drop-oldest overflow
//! - A topic-matched delivery bus with a broadcast firehose tap
//! - Read-state tracking with unread-badge signaling
//! - In-memory repository adapters for database-free tests
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use focal_db::Database;
//! use focal_realtime::{DeliveryBus, Distributor, SubscriptionRegistry};
//! use focal_core::{EventType, NewEvent};
//! use chrono::Utc;
//! use uuid::Uuid;
//!
//! let db = Database::connect("postgres://...").await?;
//! let registry = Arc::new(SubscriptionRegistry::default());
//! let bus = DeliveryBus::new(registry.clone());
//! let distributor = Distributor::from_db(&db, bus);
//!
//! // A client connects and receives frames.
//! let handle = registry.subscribe(Uuid::now_v7(), 42, Role::Staff, Some(5))?;
//! tokio::spawn(async move {
//!     while let Some(frame) = handle.queue.recv().await {
//!         println!("Frame: {:?}", frame);
//!     }
//! });
//!
//! // An upstream service reports low stock.
//! let receipt = distributor
//!     .ingest(
//!         NewEvent::new(EventType::InventoryLowStock, Utc::now())
//!             .with_branch(5)
//!             .with_payload(serde_json::json!({"product": "Ray-Ban Aviator", "available": 2})),
//!     )
//!     .await?;
//! println!("created {} notifications", receipt.notifications_created);
//! ```

pub mod bus;
pub mod distributor;
pub mod memory;
pub mod projector;
pub mod queue;
pub mod read_state;
pub mod registry;

// Re-export core types
pub use focal_core::*;

pub use bus::{DeliveryBus, FirehoseFrame, PublishReport};
pub use distributor::{Distributor, EventReceipt};
pub use memory::{MemoryEventRepository, MemoryNotificationRepository};
pub use projector::{route_event, NotificationProjector};
pub use queue::{OutboundQueue, PushResult};
pub use read_state::ReadStateTracker;
pub use registry::{ConnectionHandle, SubscriptionRegistry};
