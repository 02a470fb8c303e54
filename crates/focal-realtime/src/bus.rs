//! Fan-out of delivery frames to live connections.
//!
//! Publishing is synchronous and infallible from the caller's view: the
//! notification is already durable, so delivery failures cost only the
//! affected connection (at-least-once; reconnecting clients re-sync from
//! the durable list). Every published frame is also mirrored on a
//! process-wide broadcast firehose for the relay dispatcher, telemetry,
//! and ops stream consumers.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use focal_core::defaults::FIREHOSE_CAPACITY;
use focal_core::{DeliveryFrame, Notification, NotificationFrame, Topic};

use crate::queue::PushResult;
use crate::registry::SubscriptionRegistry;

/// One frame as seen on the firehose, tagged with its routing topic.
#[derive(Debug, Clone)]
pub struct FirehoseFrame {
    pub topic: Topic,
    pub frame: DeliveryFrame,
}

/// Per-publish delivery accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishReport {
    /// Connections subscribed to the frame's topic.
    pub matched: usize,
    /// Frames enqueued (including ones that evicted an older frame).
    pub enqueued: usize,
    /// Older frames evicted from full queues.
    pub dropped: usize,
}

/// Topic-matched frame distributor over the live connection registry.
#[derive(Clone)]
pub struct DeliveryBus {
    registry: Arc<SubscriptionRegistry>,
    firehose: broadcast::Sender<FirehoseFrame>,
}

impl DeliveryBus {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self::with_firehose_capacity(registry, FIREHOSE_CAPACITY)
    }

    pub fn with_firehose_capacity(registry: Arc<SubscriptionRegistry>, capacity: usize) -> Self {
        let (firehose, _) = broadcast::channel(capacity.max(1));
        Self { registry, firehose }
    }

    /// Push a freshly projected notification to matching connections.
    ///
    /// `created` is the insert outcome: replayed rows (`created == false`)
    /// are not re-pushed, keeping projection replays invisible to clients.
    pub fn publish(&self, notification: &Notification, created: bool) -> PublishReport {
        if !created {
            debug!(
                subsystem = "delivery",
                component = "bus",
                op = "publish.skip_replay",
                notification_id = %notification.id,
                event_id = notification.event_id,
                "Replayed projection, not re-pushed"
            );
            return PublishReport::default();
        }

        let topic = notification.topic_scope();
        let frame = DeliveryFrame::Notification {
            notification: NotificationFrame::from(notification),
        };
        self.publish_frame(topic, frame)
    }

    /// Push an unread-badge refresh to the user's private channel.
    pub fn publish_unread_count(&self, user_id: i64, count: i64) -> PublishReport {
        self.publish_frame(
            Topic::User(user_id),
            DeliveryFrame::UnreadCount {
                unread_count: count,
            },
        )
    }

    /// Broadcast an operational message to every live connection.
    pub fn publish_system(&self, message: impl Into<String>) -> PublishReport {
        self.publish_frame(
            Topic::System,
            DeliveryFrame::System {
                message: message.into(),
            },
        )
    }

    /// Enqueue `frame` on every connection subscribed to `topic`, then
    /// mirror it on the firehose.
    pub fn publish_frame(&self, topic: Topic, frame: DeliveryFrame) -> PublishReport {
        let handles = self.registry.matching(&topic);
        let mut report = PublishReport {
            matched: handles.len(),
            ..Default::default()
        };

        for handle in &handles {
            match handle.queue.push(frame.clone()) {
                PushResult::Enqueued => report.enqueued += 1,
                PushResult::Evicted(evicted) => {
                    report.enqueued += 1;
                    report.dropped += 1;
                    warn!(
                        subsystem = "delivery",
                        component = "bus",
                        op = "delivery.dropped",
                        connection_id = %handle.subscription.connection_id,
                        user_id = handle.subscription.user_id,
                        topic = %topic,
                        evicted = evicted.name(),
                        dropped_total = handle.queue.dropped(),
                        "Slow consumer, oldest frame evicted"
                    );
                }
                // Raced an unsubscribe; the consumer is already gone.
                PushResult::Closed => {}
            }
        }

        // Firehose errors only mean no receiver is currently attached.
        let _ = self.firehose.send(FirehoseFrame { topic, frame });

        debug!(
            subsystem = "delivery",
            component = "bus",
            op = "publish",
            topic = %topic,
            matched = report.matched,
            enqueued = report.enqueued,
            dropped = report.dropped,
            "Frame published"
        );
        report
    }

    /// Attach a firehose receiver. Lagging receivers observe
    /// `RecvError::Lagged` per broadcast semantics.
    pub fn subscribe_firehose(&self) -> broadcast::Receiver<FirehoseFrame> {
        self.firehose.subscribe()
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }
}
