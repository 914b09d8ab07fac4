//! WebSocket layer: inbound frames, normalizer, connection events.
//!
//! The runtime-agnostic parts (frame types, [`normalize`], [`backoff`]) are
//! always available. The native transport, the connection [`registry`] and
//! the per-consumer [`feed`] need the `ws-native` feature (`tokio-tungstenite`).

pub mod backoff;
pub mod normalize;

#[cfg(feature = "ws-native")]
pub mod feed;
#[cfg(feature = "ws-native")]
pub mod registry;
#[cfg(feature = "ws-native")]
pub mod transport;

use crate::domain::activity::ActivityQueueEntry;
use crate::domain::transaction::Transaction;
use crate::error::WsError;
use serde::Deserialize;
use serde_json::{Map, Value};

// ─── Inbound frames ──────────────────────────────────────────────────────────

/// A raw inbound frame, discriminated by its `type` field.
///
/// Every field besides `type` is optional on the wire, so the variants keep
/// loosely-typed `Value`s and leave interpretation to the normalizer.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    AllActivities(SnapshotPayload),
    SendNotification(NotificationPayload),
    Connection(ConnectionPayload),
    Error(ErrorPayload),
}

/// Full state of the pending queues, sent on connect.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotPayload {
    #[serde(default)]
    pub purchase_data: Option<Value>,
    #[serde(default)]
    pub cashout_data: Option<Value>,
    #[serde(default)]
    pub game_activities_data: Option<Value>,
    #[serde(default)]
    pub counts: Option<Value>,
}

/// One incremental change.
///
/// `body` holds every field except `type` and `counts`: the record may sit
/// directly in it, under `data`, or under `purchase_data`/`cashout_data`.
/// `activity_type` stays in the body since it may carry an operation tag
/// (`recharge`) rather than a category (`cashout`).
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationPayload {
    #[serde(default)]
    pub counts: Option<Value>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl NotificationPayload {
    pub fn activity_type(&self) -> Option<&str> {
        self.body.get("activity_type").and_then(Value::as_str)
    }
}

/// Server greeting after the socket opens.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionPayload {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ConnectionPayload {
    pub fn message(&self) -> Option<String> {
        self.fields
            .get("message")
            .or_else(|| self.fields.get("status"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Server-reported error; does not close the connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ErrorPayload {
    pub fn message(&self) -> String {
        ["message", "error", "detail"]
            .iter()
            .find_map(|key| self.fields.get(*key).and_then(Value::as_str))
            .unwrap_or("Unknown server error")
            .to_string()
    }

    pub fn code(&self) -> Option<String> {
        crate::shared::serde_util::value_to_string(self.fields.get("code")?)
    }
}

// ─── Normalized records ──────────────────────────────────────────────────────

/// A transaction handed to the record sink.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionUpdate {
    pub transaction: Transaction,
    /// `true` for records from a snapshot frame; consumers typically skip
    /// animations and notifications for these.
    pub is_initial_load: bool,
}

/// A game activity handed to the record sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityUpdate {
    pub entry: ActivityQueueEntry,
    pub is_initial_load: bool,
}

// ─── Connection lifecycle ────────────────────────────────────────────────────

/// State of one registry entry (one physical connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Closed,
    Failed,
}

impl ConnectionState {
    /// Whether the entry is still trying to (re)establish its socket.
    pub fn is_pending(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Reconnecting)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Events fanned out by the registry to every subscriber of a URL.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The entry moved to a new state.
    StateChanged(ConnectionState),
    /// The socket opened.
    Open,
    /// A raw text frame from the server.
    Message(String),
    /// The socket closed or could not be opened.
    Closed { code: Option<u16>, reason: String },
    /// A reconnect attempt is scheduled after `delay_ms`.
    Reconnecting { attempt: u32, delay_ms: u64 },
    /// A transport error, or the reconnect ceiling was hit.
    Error(WsError),
}

/// Configuration for the connection registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Delay before the first reconnect attempt (ms).
    pub base_delay_ms: u64,
    /// Upper bound for any reconnect delay (ms).
    pub max_delay_ms: u64,
    /// Failed attempts tolerated before the entry goes to `Failed`.
    pub max_reconnect_attempts: u32,
    /// Bound on a single connection attempt (ms).
    pub connect_timeout_ms: u64,
    /// Whether unexpected closes trigger reconnection at all.
    pub auto_reconnect: bool,
    /// Random jitter added to each delay (ms). 0 disables jitter.
    pub jitter_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_reconnect_attempts: 10,
            connect_timeout_ms: 30_000,
            auto_reconnect: true,
            jitter_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_default() {
        let config = RegistryConfig::default();
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30_000);
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.connect_timeout_ms, 30_000);
        assert!(config.auto_reconnect);
        assert_eq!(config.jitter_ms, 0);
    }

    #[test]
    fn test_notification_envelope_split() {
        let frame: InboundFrame = serde_json::from_value(json!({
            "type": "send_notification",
            "activity_type": "cashout",
            "counts": {"cashout_count": 2},
            "data": {"id": "7"},
            "payment_details": {"iban": "X"}
        }))
        .unwrap();

        match frame {
            InboundFrame::SendNotification(payload) => {
                assert_eq!(payload.activity_type(), Some("cashout"));
                assert!(payload.counts.is_some());
                assert!(payload.body.contains_key("data"));
                assert!(payload.body.contains_key("payment_details"));
                assert!(!payload.body.contains_key("type"));
                assert!(!payload.body.contains_key("counts"));
            }
            other => panic!("expected SendNotification, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_fails_to_parse() {
        let result = serde_json::from_value::<InboundFrame>(json!({"type": "heartbeat"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_error_payload_accessors() {
        let frame: InboundFrame =
            serde_json::from_value(json!({"type": "error", "error": "bad token", "code": 401}))
                .unwrap();
        match frame {
            InboundFrame::Error(payload) => {
                assert_eq!(payload.message(), "bad token");
                assert_eq!(payload.code().as_deref(), Some("401"));
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_connection_state_flags() {
        assert!(ConnectionState::Reconnecting.is_pending());
        assert!(ConnectionState::Failed.is_terminal());
        assert!(!ConnectionState::Open.is_terminal());
        assert_eq!(ConnectionState::Open.to_string(), "open");
    }
}
