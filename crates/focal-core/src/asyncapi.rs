//! AsyncAPI 3.0 spec builder for the focal delivery stream.
//!
//! Generates a complete AsyncAPI 3.0 document from the [`DeliveryFrame`]
//! catalog and `schemars`-derived JSON Schemas. The spec is built at runtime
//! (like the OpenAPI document) so it never drifts from the code.

use schemars::schema_for;
use serde_json::{json, Value};

use crate::models::{DeliveryFrame, NotificationFrame, Subscription};

/// Wire name, title, and summary for each frame a client can receive.
fn frame_catalog() -> [(&'static str, &'static str, &'static str); 5] {
    [
        (
            "connected",
            "Connected",
            "Subscription acknowledgement; first frame on every connection, carries the connection_id.",
        ),
        (
            "notification",
            "Notification",
            "A freshly projected notification for this recipient. De-duplicate on event_id across reconnects.",
        ),
        (
            "unread_count",
            "UnreadCount",
            "Unread-badge refresh pushed after a read-state mutation.",
        ),
        (
            "system",
            "System",
            "Operational broadcast to every live connection (e.g. server shutdown).",
        ),
        (
            "pong",
            "Pong",
            "Reply to a client {\"action\":\"ping\"} text message (WebSocket only).",
        ),
    ]
}

/// Build a complete AsyncAPI 3.0.0 specification document.
///
/// # Arguments
/// - `version`: API version string (e.g., from `env!("CARGO_PKG_VERSION")`)
/// - `server_url`: Base URL of the API server (e.g., `"https://your-domain.com"`)
pub fn build_asyncapi_spec(version: &str, server_url: &str) -> Value {
    let mut spec = json!({
        "asyncapi": "3.0.0",
        "info": {
            "title": "Focal Delivery Stream",
            "version": version,
            "description": "Real-time notification delivery for the focal clinic core. Connect to `/api/v1/ws` (WebSocket) or `/api/v1/events/stream` (SSE) to receive notifications for the authenticated identity as they are projected.",
            "license": {
                "name": "MIT",
                "url": "https://github.com/everbright-labs/focal/blob/main/LICENSE"
            }
        },
        "servers": {
            "production": {
                "host": server_url,
                "protocol": "https",
                "description": "Focal API server (WebSocket upgrade and SSE over HTTPS)"
            }
        },
        "channels": {
            "ws": {
                "address": "/api/v1/ws",
                "description": "WebSocket channel delivering JSON frames for the authenticated identity. Identity is supplied by the auth gateway via X-User-Id / X-User-Role / X-Branch-Id headers on the upgrade request. The server sends a protocol ping every 30 seconds.",
                "messages": {}
            },
            "stream": {
                "address": "/api/v1/events/stream",
                "description": "Server-Sent Events channel carrying the same frames as the WebSocket channel (minus pong), as named SSE events with a keep-alive comment every 15 seconds. Delivery is live-only; reconnecting clients re-sync via GET /api/v1/notifications.",
                "messages": {}
            }
        },
        "operations": {
            "receiveWs": {
                "action": "receive",
                "channel": { "$ref": "#/channels/ws" },
                "summary": "Receive delivery frames over WebSocket",
                "description": "Subscribe by upgrading; the first frame is always `connected`. Frames for a connection arrive in FIFO order; on queue overflow the oldest undelivered frame is dropped."
            },
            "receiveStream": {
                "action": "receive",
                "channel": { "$ref": "#/channels/stream" },
                "summary": "Receive delivery frames over SSE",
                "description": "Each frame is emitted as an SSE event whose name is the frame discriminator and whose data is the JSON frame."
            }
        },
        "components": {
            "schemas": {}
        }
    });

    // Build the message catalog once, then wire it into both channels.
    let mut ws_refs = Vec::new();
    let mut stream_refs = Vec::new();

    for (name, title, summary) in frame_catalog() {
        let message = json!({
            "name": name,
            "title": title,
            "summary": summary,
            "contentType": "application/json",
            "payload": {
                "$ref": "#/components/schemas/DeliveryFrame"
            },
            "x-frame": name
        });
        spec["channels"]["ws"]["messages"][title] = message.clone();
        ws_refs.push(json!({
            "$ref": format!("#/channels/ws/messages/{}", title)
        }));
        if name != "pong" {
            spec["channels"]["stream"]["messages"][title] = message;
            stream_refs.push(json!({
                "$ref": format!("#/channels/stream/messages/{}", title)
            }));
        }
    }

    spec["operations"]["receiveWs"]["messages"] = Value::Array(ws_refs);
    spec["operations"]["receiveStream"]["messages"] = Value::Array(stream_refs);

    // Generate schemas from schemars and remap $ref paths
    let schemas = spec["components"]["schemas"].as_object_mut().unwrap();

    let frame_schema = remap_refs(schema_for!(DeliveryFrame));
    let notification_schema = remap_refs(schema_for!(NotificationFrame));
    let subscription_schema = remap_refs(schema_for!(Subscription));

    insert_schema(schemas, "DeliveryFrame", &frame_schema);
    insert_schema(schemas, "NotificationFrame", &notification_schema);
    insert_schema(schemas, "Subscription", &subscription_schema);

    // Hoist nested definitions from each root schema into components/schemas
    for root in [&frame_schema, &notification_schema, &subscription_schema] {
        let root_val = serde_json::to_value(root).unwrap();
        if let Some(defs) = root_val.get("definitions").and_then(|d| d.as_object()) {
            for (name, def) in defs {
                if !schemas.contains_key(name) {
                    schemas.insert(name.clone(), remap_refs_value(def.clone()));
                }
            }
        }
    }

    spec
}

/// Insert a schemars root schema into the schemas map, stripping `definitions`
/// and `$schema` to keep the components section clean.
fn insert_schema(
    schemas: &mut serde_json::Map<String, Value>,
    name: &str,
    schema: &schemars::schema::RootSchema,
) {
    let mut val = serde_json::to_value(&schema.schema).unwrap();
    // Remove schemars metadata that doesn't belong in AsyncAPI
    if let Some(obj) = val.as_object_mut() {
        obj.remove("$schema");
        obj.remove("definitions");
    }
    remap_refs_in_place(&mut val);
    schemas.insert(name.to_string(), val);
}

/// Remap all `#/definitions/Foo` references to `#/components/schemas/Foo`
/// in a schemars RootSchema.
fn remap_refs(schema: schemars::schema::RootSchema) -> schemars::schema::RootSchema {
    let mut val = serde_json::to_value(&schema).unwrap();
    remap_refs_in_place(&mut val);
    serde_json::from_value(val).unwrap()
}

/// Recursively rewrite `$ref` values from schemars format to AsyncAPI format.
fn remap_refs_in_place(val: &mut Value) {
    match val {
        Value::Object(map) => {
            if let Some(Value::String(r)) = map.get_mut("$ref") {
                if r.starts_with("#/definitions/") {
                    *r = r.replace("#/definitions/", "#/components/schemas/");
                }
            }
            for v in map.values_mut() {
                remap_refs_in_place(v);
            }
        }
        Value::Array(arr) => {
            for v in arr {
                remap_refs_in_place(v);
            }
        }
        _ => {}
    }
}

/// Remap refs in an arbitrary serde_json::Value.
fn remap_refs_value(mut val: Value) -> Value {
    remap_refs_in_place(&mut val);
    val
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_spec_produces_valid_structure() {
        let spec = build_asyncapi_spec("2026.2.4", "https://example.com");

        assert_eq!(spec["asyncapi"], "3.0.0");
        assert_eq!(spec["info"]["title"], "Focal Delivery Stream");
        assert_eq!(spec["info"]["version"], "2026.2.4");
        assert_eq!(spec["info"]["license"]["name"], "MIT");

        // Server
        assert_eq!(spec["servers"]["production"]["host"], "https://example.com");
        assert_eq!(spec["servers"]["production"]["protocol"], "https");

        // Channels
        assert_eq!(spec["channels"]["ws"]["address"], "/api/v1/ws");
        assert_eq!(
            spec["channels"]["stream"]["address"],
            "/api/v1/events/stream"
        );

        // All five frames on ws, pong excluded from SSE
        let ws_messages = spec["channels"]["ws"]["messages"]
            .as_object()
            .expect("ws messages should be an object");
        assert_eq!(ws_messages.len(), 5);
        let stream_messages = spec["channels"]["stream"]["messages"]
            .as_object()
            .expect("stream messages should be an object");
        assert_eq!(stream_messages.len(), 4);
        assert!(!stream_messages.contains_key("Pong"));

        // Operations reference their channel's messages
        assert_eq!(
            spec["operations"]["receiveWs"]["messages"]
                .as_array()
                .unwrap()
                .len(),
            5
        );
        assert_eq!(
            spec["operations"]["receiveStream"]["messages"]
                .as_array()
                .unwrap()
                .len(),
            4
        );

        // Schemas present
        let schemas = spec["components"]["schemas"]
            .as_object()
            .expect("schemas should be an object");
        assert!(
            schemas.contains_key("DeliveryFrame"),
            "Missing DeliveryFrame schema"
        );
        assert!(
            schemas.contains_key("NotificationFrame"),
            "Missing NotificationFrame schema"
        );
        assert!(
            schemas.contains_key("Subscription"),
            "Missing Subscription schema"
        );
    }

    #[test]
    fn schemas_use_asyncapi_refs() {
        let spec = build_asyncapi_spec("1.0.0", "https://example.com");
        let spec_str = serde_json::to_string_pretty(&spec).unwrap();

        // No leftover schemars-style refs
        assert!(
            !spec_str.contains("#/definitions/"),
            "Found leftover #/definitions/ ref in spec:\n{}",
            spec_str
        );
    }

    #[test]
    fn spec_serializes_to_yaml() {
        let spec = build_asyncapi_spec("2026.2.4", "https://example.com");
        let yaml = serde_yaml::to_string(&spec).expect("YAML serialization must succeed");

        assert!(yaml.contains("asyncapi: 3.0.0"));
        assert!(yaml.contains("Focal Delivery Stream"));
        assert!(yaml.contains("/api/v1/ws"));
        assert!(yaml.contains("/api/v1/events/stream"));
    }

    #[test]
    fn messages_have_extension_fields() {
        let spec = build_asyncapi_spec("1.0.0", "https://example.com");
        let messages = spec["channels"]["ws"]["messages"].as_object().unwrap();

        let notification = &messages["Notification"];
        assert_eq!(notification["x-frame"], "notification");
        assert_eq!(notification["contentType"], "application/json");

        let connected = &messages["Connected"];
        assert_eq!(connected["x-frame"], "connected");
    }
}
