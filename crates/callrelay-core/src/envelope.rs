//! JSON frames exchanged with relay clients.
//!
//! Server → client: `{"type": ..., "timestamp": ..., "data": {...}}`.
//! Client → server: `{"type": "register", "data": {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::EventType;

/// Event names a connection may receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    /// Registration accepted.
    RegistrationSuccess,
    /// Registration rejected.
    RegistrationError,
    /// Another connection registered.
    PeerConnected,
    /// A registered connection closed.
    PeerDisconnected,
    /// A routed call event.
    Call(EventType),
}

impl ServerEvent {
    /// Wire name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RegistrationSuccess => "registrationSuccess",
            Self::RegistrationError => "registrationError",
            Self::PeerConnected => "peerConnected",
            Self::PeerDisconnected => "peerDisconnected",
            Self::Call(event_type) => event_type.as_str(),
        }
    }
}

/// Server → client frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name.
    #[serde(rename = "type")]
    pub event_type: String,
    /// RFC 3339 emission time.
    pub timestamp: String,
    /// Event body.
    pub data: Value,
}

impl Envelope {
    /// Build an envelope stamped with the current time.
    pub fn new(event: ServerEvent, data: Value) -> Self {
        Self {
            event_type: event.as_str().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }

    /// Serialize to a JSON string, logging on failure.
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::warn!(event_type = %self.event_type, error = %e, "failed to serialize envelope");
                None
            }
        }
    }
}

/// Client → server frame.
#[derive(Clone, Debug, Deserialize)]
pub struct ClientFrame {
    /// Frame kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Frame body.
    #[serde(default)]
    pub data: Value,
}

/// Recognized client frame kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientFrameKind {
    /// Registration request (`register` or the legacy `registerAgent`).
    Register,
}

impl ClientFrame {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Classify the frame, `None` for unknown kinds.
    pub fn kind(&self) -> Option<ClientFrameKind> {
        match self.kind.as_str() {
            "register" | "registerAgent" => Some(ClientFrameKind::Register),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_event_names() {
        assert_eq!(ServerEvent::RegistrationSuccess.as_str(), "registrationSuccess");
        assert_eq!(ServerEvent::RegistrationError.as_str(), "registrationError");
        assert_eq!(ServerEvent::PeerConnected.as_str(), "peerConnected");
        assert_eq!(ServerEvent::PeerDisconnected.as_str(), "peerDisconnected");
        assert_eq!(ServerEvent::Call(EventType::CallRecording).as_str(), "callRecording");
    }

    #[test]
    fn envelope_wire_shape() {
        let env = Envelope::new(ServerEvent::PeerDisconnected, json!({"externalId": "a"}));
        let value: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "peerDisconnected");
        assert_eq!(value["data"]["externalId"], "a");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn parse_register_frames() {
        let frame = ClientFrame::parse(r#"{"type":"registerAgent","data":{"agentId":"x"}}"#).unwrap();
        assert_eq!(frame.kind(), Some(ClientFrameKind::Register));
        assert_eq!(frame.data["agentId"], "x");

        let frame = ClientFrame::parse(r#"{"type":"register"}"#).unwrap();
        assert_eq!(frame.kind(), Some(ClientFrameKind::Register));
        assert!(frame.data.is_null());
    }

    #[test]
    fn unknown_frame_kind() {
        let frame = ClientFrame::parse(r#"{"type":"subscribe","data":{}}"#).unwrap();
        assert_eq!(frame.kind(), None);
    }

    #[test]
    fn invalid_frame_is_error() {
        assert!(ClientFrame::parse("not json").is_err());
        assert!(ClientFrame::parse(r#"{"data":{}}"#).is_err());
    }
}
