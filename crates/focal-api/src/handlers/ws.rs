//! WebSocket delivery endpoint.
//!
//! Each connection registers in the subscription registry and drains its
//! own bounded outbound queue; the bus never blocks on a slow client.
//! The first frame on every connection is the `connected` ack carrying
//! the connection id.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use focal_core::defaults::WS_PING_INTERVAL_SECS;
use focal_core::DeliveryFrame;
use focal_realtime::ConnectionHandle;

use crate::error::ApiError;
use crate::identity::CallerIdentity;
use crate::AppState;

/// Client-initiated application message. Only `{"action":"ping"}` is
/// recognized; everything else is ignored.
#[derive(Debug, Deserialize)]
struct ClientMessage {
    action: String,
}

/// GET /api/v1/ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    identity: CallerIdentity,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let connection_id = Uuid::now_v7();
    let handle = state.bus.registry().subscribe(
        connection_id,
        identity.user_id,
        identity.role,
        identity.branch_id,
    )?;

    // Queued before the socket opens, so the ack is the first frame out.
    handle.queue.push(DeliveryFrame::Connected { connection_id });

    let registry = state.bus.registry().clone();
    Ok(ws
        .on_failed_upgrade(move |_err| {
            registry.unsubscribe(&connection_id);
        })
        .on_upgrade(move |socket| handle_ws_connection(socket, state, handle)))
}

async fn handle_ws_connection(socket: WebSocket, state: AppState, handle: Arc<ConnectionHandle>) {
    use futures::{SinkExt, StreamExt};

    let connection_id = handle.subscription.connection_id;
    let user_id = handle.subscription.user_id;
    tracing::info!(
        connection_id = %connection_id,
        user_id,
        role = handle.subscription.role.as_str(),
        branch_id = ?handle.subscription.branch_id,
        connections = state.bus.registry().len(),
        "WebSocket connection opened"
    );

    let (mut sender, mut receiver) = socket.split();

    // Forward queued frames to the client, interleaved with protocol pings.
    let send_handle = handle.clone();
    let send_task = tokio::spawn(async move {
        let mut ping_interval =
            tokio::time::interval(std::time::Duration::from_secs(WS_PING_INTERVAL_SECS));
        // First tick fires immediately; skip it so pings start after the interval.
        ping_interval.tick().await;
        loop {
            tokio::select! {
                frame = send_handle.queue.recv() => {
                    match frame {
                        Some(frame) => {
                            if let Ok(json) = serde_json::to_string(&frame) {
                                if sender.send(Message::Text(json)).await.is_err() {
                                    break;
                                }
                            }
                        }
                        // Queue closed: unsubscribed or server shutdown.
                        None => {
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
                _ = ping_interval.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Handle application pings and close frames from the client.
    let recv_handle = handle.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(ref text) => {
                    if let Ok(parsed) = serde_json::from_str::<ClientMessage>(text) {
                        if parsed.action == "ping" {
                            recv_handle.queue.push(DeliveryFrame::Pong);
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Either side finishing tears the connection down; closing the queue
    // wakes whichever task is still parked.
    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }
    state.bus.registry().unsubscribe(&connection_id);

    tracing::info!(
        connection_id = %connection_id,
        user_id,
        connections = state.bus.registry().len(),
        dropped = handle.queue.dropped(),
        "WebSocket connection closed"
    );
}
