//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.
//! A connection is either request-response or, after `Subscribe`, a one-way
//! stream of [`Notification`] frames.

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_THRESHOLD_MS;
use crate::events::HoldEvent;

/// Requests from clients to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Change the hold threshold; persisted and applied to subsequent presses
    SetThreshold {
        /// New threshold in milliseconds, must be positive
        threshold_ms: u64,
    },

    /// Ping to check connectivity
    Ping,

    /// Switch this connection to a stream of hold notifications
    Subscribe,
}

/// Responses from daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Threshold change accepted
    ThresholdChanged {
        /// The threshold now in effect
        threshold_ms: u64,
    },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed; hold notifications follow on this connection
    Subscribed,

    /// Error response
    Error {
        /// Machine-readable error code
        code: String,
        /// Human-readable description
        message: String,
    },
}

/// Push messages to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A key was held past the threshold
    Hold(HoldEvent),
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Hold threshold currently in effect, in milliseconds
    pub threshold_ms: u64,

    /// Whether the global key listener is running
    pub listener_active: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            threshold_ms: DEFAULT_THRESHOLD_MS,
            listener_active: false,
            uptime_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyCode;

    #[test]
    fn test_request_serialization() {
        let req = Request::SetThreshold { threshold_ms: 2500 };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("set_threshold"));
        assert!(json.contains("2500"));
    }

    #[test]
    fn test_request_deserialization() {
        let json = r#"{"type":"get_status"}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert!(matches!(req, Request::GetStatus));
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("3000"));
    }

    #[test]
    fn test_notification_serialization() {
        let note = Notification::Hold(HoldEvent {
            code: KeyCode(49),
            duration_ms: 3100,
        });
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("hold"));
        assert!(json.contains("3100"));
    }
}
