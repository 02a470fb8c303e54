//! Ingest pipeline: append, project, publish.
//!
//! The durable writes come first; live delivery happens only after the
//! event and its notification rows are committed, so a crash between the
//! two never loses a notification, only a push (clients re-sync from the
//! durable list on reconnect).

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use focal_core::{Event, EventRepository, NewEvent, NotificationRepository, Result};
use focal_db::Database;

use crate::bus::DeliveryBus;
use crate::projector::NotificationProjector;

/// Outcome of ingesting one event.
#[derive(Debug, Clone, Serialize)]
pub struct EventReceipt {
    pub event_id: i64,
    /// False when the event type had no routing entry (stored anyway).
    pub routed: bool,
    /// Rows created by this ingest; zero for replays of a seen event.
    pub notifications_created: usize,
}

/// End-to-end event intake: durable append, projection, live fan-out.
pub struct Distributor {
    events: Arc<dyn EventRepository>,
    projector: NotificationProjector,
    bus: DeliveryBus,
}

impl Distributor {
    pub fn new(
        events: Arc<dyn EventRepository>,
        notifications: Arc<dyn NotificationRepository>,
        bus: DeliveryBus,
    ) -> Self {
        Self {
            events,
            projector: NotificationProjector::new(notifications),
            bus,
        }
    }

    /// Wire against the PostgreSQL repositories.
    pub fn from_db(db: &Database, bus: DeliveryBus) -> Self {
        Self::new(
            Arc::new(db.events.clone()),
            Arc::new(db.notifications.clone()),
            bus,
        )
    }

    /// Append a new event, project it, and push the resulting rows.
    pub async fn ingest(&self, new_event: NewEvent) -> Result<EventReceipt> {
        let event = self.events.append(new_event).await?;
        self.dispatch(&event).await
    }

    /// Project and publish one stored event.
    ///
    /// Replay-safe: rows that already exist are neither duplicated nor
    /// re-pushed. Unroutable events are recorded and succeed with
    /// `routed = false`.
    pub async fn dispatch(&self, event: &Event) -> Result<EventReceipt> {
        let inserted = match self.projector.project(event).await {
            Ok(inserted) => inserted,
            Err(e) if e.is_non_fatal() => {
                warn!(
                    subsystem = "projector",
                    op = "event.unroutable",
                    event_id = event.id,
                    event_type = event.event_type.as_str(),
                    "Event stored without notifications"
                );
                return Ok(EventReceipt {
                    event_id: event.id,
                    routed: false,
                    notifications_created: 0,
                });
            }
            Err(e) => return Err(e),
        };

        let mut created = 0;
        for item in &inserted {
            if item.created {
                created += 1;
            }
            self.bus.publish(&item.notification, item.created);
        }

        info!(
            subsystem = "delivery",
            op = "event.dispatched",
            event_id = event.id,
            event_type = event.event_type.as_str(),
            result_count = inserted.len(),
            created,
            "Event dispatched"
        );
        Ok(EventReceipt {
            event_id: event.id,
            routed: true,
            notifications_created: created,
        })
    }

    pub fn events(&self) -> &Arc<dyn EventRepository> {
        &self.events
    }

    pub fn bus(&self) -> &DeliveryBus {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryEventRepository, MemoryNotificationRepository};
    use crate::registry::SubscriptionRegistry;
    use chrono::Utc;
    use focal_core::{DeliveryFrame, Error, EventType, Role};
    use serde_json::json;
    use uuid::Uuid;

    struct Fixture {
        distributor: Distributor,
        events: Arc<MemoryEventRepository>,
        registry: Arc<SubscriptionRegistry>,
    }

    fn fixture() -> Fixture {
        let events = Arc::new(MemoryEventRepository::new());
        let notifications = Arc::new(MemoryNotificationRepository::new());
        let registry = Arc::new(SubscriptionRegistry::default());
        let bus = DeliveryBus::new(registry.clone());
        let distributor = Distributor::new(events.clone(), notifications, bus);
        Fixture {
            distributor,
            events,
            registry,
        }
    }

    fn low_stock() -> NewEvent {
        NewEvent::new(EventType::InventoryLowStock, Utc::now())
            .with_branch(5)
            .with_payload(json!({"product": "Ray-Ban Aviator", "available": 2}))
    }

    #[tokio::test]
    async fn test_ingest_appends_projects_and_pushes() {
        let f = fixture();
        let staff = f
            .registry
            .subscribe(Uuid::now_v7(), 3, Role::Staff, Some(5))
            .unwrap();
        let other_branch = f
            .registry
            .subscribe(Uuid::now_v7(), 4, Role::Staff, Some(7))
            .unwrap();

        let receipt = f.distributor.ingest(low_stock()).await.unwrap();
        assert!(receipt.routed);
        assert_eq!(receipt.notifications_created, 2);
        assert_eq!(f.events.count().await.unwrap(), 1);

        let frame = staff.queue.recv().await.unwrap();
        match frame {
            DeliveryFrame::Notification { notification } => {
                assert_eq!(notification.title, "Low Stock Alert");
                assert_eq!(notification.message, "Ray-Ban Aviator: 2 left");
                assert_eq!(notification.event_id, receipt.event_id);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
        assert!(other_branch.queue.is_empty());
    }

    #[tokio::test]
    async fn test_replayed_dispatch_creates_and_pushes_nothing() {
        let f = fixture();
        let receipt = f.distributor.ingest(low_stock()).await.unwrap();
        assert_eq!(receipt.notifications_created, 2);

        let staff = f
            .registry
            .subscribe(Uuid::now_v7(), 3, Role::Staff, Some(5))
            .unwrap();

        let event = f.events.get(receipt.event_id).await.unwrap();
        let replay = f.distributor.dispatch(&event).await.unwrap();
        assert!(replay.routed);
        assert_eq!(replay.notifications_created, 0);
        assert!(staff.queue.is_empty());
    }

    #[tokio::test]
    async fn test_unroutable_event_is_stored_and_succeeds() {
        let f = fixture();
        let receipt = f
            .distributor
            .ingest(
                NewEvent::new(EventType::TransferCompleted, Utc::now())
                    .with_payload(json!({"transfer_id": 88})),
            )
            .await
            .unwrap();

        assert!(!receipt.routed);
        assert_eq!(receipt.notifications_created, 0);
        assert_eq!(f.events.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_event_is_rejected_before_append() {
        let f = fixture();
        let err = f
            .distributor
            .ingest(
                NewEvent::new(EventType::UserSignup, Utc::now())
                    .with_payload(json!("not an object")),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(f.events.count().await.unwrap(), 0);
    }
}
