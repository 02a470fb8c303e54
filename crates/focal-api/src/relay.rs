//! Outbound frame relay.
//!
//! When `RELAY_URL` is configured, every frame that crosses the delivery
//! bus is POSTed to it, HMAC-signed when `RELAY_SECRET` is set. This is
//! the seam a multi-process deployment plugs a fan-out relay into; a
//! single-process deployment simply leaves it unset. Delivery failures
//! are logged and never propagate — the relay is an observer, not a
//! participant, of the delivery path.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use focal_core::defaults::RELAY_TIMEOUT_SECS;
use focal_realtime::DeliveryBus;

type HmacSha256 = Hmac<Sha256>;

/// Signature header carried on every relay request.
pub const SIGNATURE_HEADER: &str = "X-Focal-Signature";
/// Frame discriminator header, so relays can filter without parsing.
pub const FRAME_HEADER: &str = "X-Focal-Frame";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub url: String,
    pub secret: Option<String>,
}

impl RelayConfig {
    /// Read `RELAY_URL` / `RELAY_SECRET`; `None` when no relay is configured.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("RELAY_URL").ok().filter(|u| !u.is_empty())?;
        let secret = std::env::var("RELAY_SECRET").ok().filter(|s| !s.is_empty());
        Some(Self { url, secret })
    }
}

/// Compute the `sha256=<hex>` signature for a relay body.
pub fn sign_body(secret: &str, body: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body.as_bytes());
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Relay dispatcher: subscribes to the bus firehose and POSTs each frame.
pub async fn relay_dispatcher(bus: DeliveryBus, config: RelayConfig) {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(RELAY_TIMEOUT_SECS))
        .build()
        .unwrap_or_default();

    tracing::info!(url = %config.url, signed = config.secret.is_some(), "Relay dispatcher started");

    let mut rx = bus.subscribe_firehose();
    loop {
        match rx.recv().await {
            Ok(event) => {
                // Frame object with the routing topic alongside the
                // `frame` discriminator.
                let mut payload = match serde_json::to_value(&event.frame) {
                    Ok(Value::Object(map)) => map,
                    _ => continue,
                };
                let topic = match serde_json::to_value(&event.topic) {
                    Ok(t) => t,
                    Err(_) => continue,
                };
                payload.insert("topic".to_string(), topic);

                let frame_name = event.frame.name();
                let client = client.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    deliver_frame(&client, &config, frame_name, &Value::Object(payload)).await;
                });
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(missed = n, "Relay dispatcher lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Deliver one frame to the relay with optional HMAC signing.
async fn deliver_frame(
    client: &reqwest::Client,
    config: &RelayConfig,
    frame_name: &str,
    payload: &Value,
) {
    let body = serde_json::to_string(payload).unwrap_or_default();

    let mut request = client
        .post(&config.url)
        .header("Content-Type", "application/json")
        .header(FRAME_HEADER, frame_name);

    if let Some(secret) = &config.secret {
        if let Some(signature) = sign_body(secret, &body) {
            request = request.header(SIGNATURE_HEADER, signature);
        }
    }

    match request.body(body).send().await {
        Ok(response) if response.status().is_success() => {
            tracing::debug!(frame = frame_name, status = %response.status(), "Relay delivery ok");
        }
        Ok(response) => {
            tracing::warn!(
                frame = frame_name,
                status = %response.status(),
                "Relay delivery rejected"
            );
        }
        Err(e) => {
            tracing::warn!(frame = frame_name, error = %e, "Relay delivery failed");
        }
    }
}
