//! Delivery telemetry mirror.
//!
//! Re-logs every frame that crosses the bus under the `focal::deliveries`
//! target, giving operators one greppable stream of what went out without
//! touching the delivery path. Filter with
//! `RUST_LOG=focal::deliveries=info`.

use focal_core::DeliveryFrame;
use focal_realtime::DeliveryBus;

pub async fn telemetry_mirror(bus: DeliveryBus) {
    let mut rx = bus.subscribe_firehose();
    loop {
        match rx.recv().await {
            Ok(event) => match &event.frame {
                DeliveryFrame::Notification { notification } => {
                    tracing::info!(
                        target: "focal::deliveries",
                        frame = "notification",
                        topic = %event.topic,
                        notification_id = %notification.notification_id,
                        event_id = notification.event_id,
                        kind = notification.kind.as_str(),
                        "Notification delivered"
                    );
                }
                DeliveryFrame::UnreadCount { unread_count } => {
                    tracing::debug!(
                        target: "focal::deliveries",
                        frame = "unread_count",
                        topic = %event.topic,
                        unread_count,
                        "Badge refreshed"
                    );
                }
                DeliveryFrame::System { message } => {
                    tracing::info!(
                        target: "focal::deliveries",
                        frame = "system",
                        topic = %event.topic,
                        message = %message,
                        "System broadcast"
                    );
                }
                // Per-connection handshake frames are registry noise here.
                DeliveryFrame::Connected { .. } | DeliveryFrame::Pong => {}
            },
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(missed = n, "Telemetry mirror lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}
