//! Server-Sent Events delivery endpoint.
//!
//! Same subscription machinery as the WebSocket endpoint: the connection
//! registers in the registry and drains its own bounded queue, so SSE
//! clients get identical routing and backpressure behavior. Frames go out
//! as named SSE events; `pong` never appears here (SSE has no inbound
//! channel to ping on).

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use uuid::Uuid;

use focal_core::defaults::SSE_KEEPALIVE_SECS;
use focal_core::DeliveryFrame;
use focal_realtime::{ConnectionHandle, SubscriptionRegistry};

use crate::error::ApiError;
use crate::identity::CallerIdentity;
use crate::AppState;

/// Unsubscribes when the response stream is dropped, which is how an SSE
/// client disconnect surfaces on the server.
struct SseConnection {
    handle: Arc<ConnectionHandle>,
    registry: Arc<SubscriptionRegistry>,
}

impl Drop for SseConnection {
    fn drop(&mut self) {
        let connection_id = self.handle.subscription.connection_id;
        self.registry.unsubscribe(&connection_id);
        tracing::info!(
            connection_id = %connection_id,
            user_id = self.handle.subscription.user_id,
            connections = self.registry.len(),
            dropped = self.handle.queue.dropped(),
            "SSE connection closed"
        );
    }
}

/// GET /api/v1/events/stream
pub async fn sse_stream(
    identity: CallerIdentity,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let connection_id = Uuid::now_v7();
    let handle = state.bus.registry().subscribe(
        connection_id,
        identity.user_id,
        identity.role,
        identity.branch_id,
    )?;
    handle.queue.push(DeliveryFrame::Connected { connection_id });

    tracing::info!(
        connection_id = %connection_id,
        user_id = identity.user_id,
        role = identity.role.as_str(),
        branch_id = ?identity.branch_id,
        connections = state.bus.registry().len(),
        "SSE connection opened"
    );

    let connection = SseConnection {
        handle,
        registry: state.bus.registry().clone(),
    };

    let stream = futures::stream::unfold(connection, |connection| async move {
        loop {
            match connection.handle.queue.recv().await {
                Some(frame) => {
                    if let Ok(json) = serde_json::to_string(&frame) {
                        let event = Event::default().event(frame.name()).data(json);
                        return Some((Ok(event), connection));
                    }
                }
                // Queue closed: unsubscribed or server shutdown.
                None => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(SSE_KEEPALIVE_SECS))
            .text("keepalive"),
    ))
}
