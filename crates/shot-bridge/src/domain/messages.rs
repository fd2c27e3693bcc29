//! JSON message types for the browser-facing WebSocket protocol.
//!
//! # JSON discriminant
//!
//! Every message is a JSON object with a `"type"` field that identifies the
//! variant.  Server messages nest their payload under `"data"`:
//!
//! ```json
//! {"type":"connected","message":"Connected to Shot Bridge"}
//! {"type":"shot","data":{"ball_speed":120.0,"spin_axis":-2.0,"total_spin":2800.0,"hla":2.5,"vla":15.0}}
//! {"type":"pong"}
//! ```
//!
//! Serde's `#[serde(tag = "type")]` attribute handles this automatically.
//!
//! # Why separate browser→bridge and bridge→browser message types?
//!
//! The browser only ever sends small control messages; the bridge only ever
//! sends acknowledgements and events.  Two enums make it a compile-time error
//! to mix them up.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use shot_core::{ShotEvent, StatusEvent};

/// Text of the acknowledgement sent when a session opens.
pub const CONNECTED_MESSAGE: &str = "Connected to Shot Bridge";

// ── Bridge → Browser messages ─────────────────────────────────────────────────

/// All typed messages the bridge sends to browsers.
///
/// Arbitrary `{"type": ..., "data": ...}` broadcasts that do not have a
/// variant here go through [`Envelope`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// First message on every session.
    Connected { message: String },

    /// A shot measured by the device (or synthesised on request).
    Shot { data: ShotEvent },

    /// A device health report.
    Status { data: StatusEvent },

    /// Reply to a browser `ping`.
    Pong,
}

impl ServerMsg {
    /// The acknowledgement sent on session open.
    pub fn connected() -> Self {
        ServerMsg::Connected {
            message: CONNECTED_MESSAGE.to_string(),
        }
    }
}

/// An untyped broadcast: `{"type": msg_type, "data": data}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<'a> {
    #[serde(rename = "type")]
    pub msg_type: &'a str,
    pub data: &'a Value,
}

// ── Browser → Bridge messages ─────────────────────────────────────────────────

/// All messages a browser can send to the bridge.
///
/// Unknown `"type"` values deserialize to [`ClientMsg::Unknown`] and are
/// ignored by the session handler, so newer browser builds can talk to an
/// older bridge without being disconnected.
///
/// ```json
/// {"type":"ping"}
/// {"type":"ready","game":"darts"}
/// {"type":"request_test_shot"}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Application-level liveness check.  Answered with [`ServerMsg::Pong`].
    Ping,

    /// The browser game finished loading.  Logged only.
    Ready {
        #[serde(default)]
        game: Option<String>,
    },

    /// Ask the bridge to broadcast a canned shot to every subscriber.
    RequestTestShot,

    /// Any other `"type"` value.
    #[serde(other)]
    Unknown,
}

impl ClientMsg {
    /// Short variant name for log messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMsg::Ping => "ping",
            ClientMsg::Ready { .. } => "ready",
            ClientMsg::RequestTestShot => "request_test_shot",
            ClientMsg::Unknown => "unknown",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connected_serializes_with_message() {
        let json = serde_json::to_value(ServerMsg::connected()).unwrap();
        assert_eq!(
            json,
            json!({"type": "connected", "message": "Connected to Shot Bridge"})
        );
    }

    #[test]
    fn test_pong_serializes_to_bare_type() {
        let json = serde_json::to_string(&ServerMsg::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_shot_nests_event_under_data() {
        // Arrange
        let msg = ServerMsg::Shot {
            data: ShotEvent::new(120.0, -2.0, 2800.0, 2.5, 15.0),
        };

        // Act
        let json = serde_json::to_value(&msg).unwrap();

        // Assert
        assert_eq!(json["type"], "shot");
        assert_eq!(json["data"]["ball_speed"], 120.0);
        assert_eq!(json["data"]["vla"], 15.0);
        assert!(json["data"].get("club").is_none());
    }

    #[test]
    fn test_status_nests_event_under_data() {
        let msg = ServerMsg::Status {
            data: StatusEvent {
                uptime_seconds: 5,
                firmware_version: "1.0".to_string(),
                shot_count: 2,
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["data"]["shot_count"], 2);
    }

    #[test]
    fn test_envelope_uses_dynamic_type() {
        let data = json!({"level": 3});
        let json = serde_json::to_value(Envelope {
            msg_type: "game_event",
            data: &data,
        })
        .unwrap();
        assert_eq!(json, json!({"type": "game_event", "data": {"level": 3}}));
    }

    #[test]
    fn test_parse_ping() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, ClientMsg::Ping);
    }

    #[test]
    fn test_parse_ping_with_extra_fields() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"ping","ts":123}"#).unwrap();
        assert_eq!(msg, ClientMsg::Ping);
    }

    #[test]
    fn test_parse_ready_with_game() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"ready","game":"darts"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMsg::Ready {
                game: Some("darts".to_string())
            }
        );
    }

    #[test]
    fn test_parse_ready_without_game() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(msg, ClientMsg::Ready { game: None });
    }

    #[test]
    fn test_parse_request_test_shot() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"request_test_shot"}"#).unwrap();
        assert_eq!(msg, ClientMsg::RequestTestShot);
    }

    #[test]
    fn test_unknown_type_maps_to_unknown_variant() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"teleport","x":1}"#).unwrap();
        assert_eq!(msg, ClientMsg::Unknown);
    }

    #[test]
    fn test_missing_type_is_an_error() {
        let result = serde_json::from_str::<ClientMsg>(r#"{"game":"darts"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_object_is_an_error() {
        assert!(serde_json::from_str::<ClientMsg>("42").is_err());
        assert!(serde_json::from_str::<ClientMsg>("not json").is_err());
    }

    #[test]
    fn test_type_names_match_wire_values() {
        assert_eq!(ClientMsg::RequestTestShot.type_name(), "request_test_shot");
        assert_eq!(ClientMsg::Ready { game: None }.type_name(), "ready");
    }
}
