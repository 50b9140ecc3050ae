//! Relay vocabulary: connection classes, event types, registrations and
//! routing targets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{RegistrationError, RouterError};

/// A connection's declared role.
///
/// Controls payload shaping (`Mobile`) and shadow delivery (`LoggingSink`).
/// Unrecognized classes are kept verbatim and routed like `Generic`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionClass {
    /// Plain consumer of raw payloads.
    #[default]
    Generic,
    /// Mobile client; receives the reduced payload.
    Mobile,
    /// Observer that receives a shadow copy of every directed event.
    LoggingSink,
    /// Any other declared class.
    Custom(String),
}

impl ConnectionClass {
    /// Parse a declared class name. Legacy agent type names are accepted.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" | "generic" => Self::Generic,
            "mobile" | "mobile_client" | "android" => Self::Mobile,
            "logging-sink" | "logging_sink" | "logger" => Self::LoggingSink,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Canonical wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Generic => "generic",
            Self::Mobile => "mobile",
            Self::LoggingSink => "logging-sink",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for ConnectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConnectionClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConnectionClass {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Recognized call event types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    /// `incomingCall`
    IncomingCall,
    /// `outgoingCall`
    OutgoingCall,
    /// `callRecording`
    CallRecording,
}

impl EventType {
    /// All recognized event types.
    pub const ALL: [Self; 3] = [Self::IncomingCall, Self::OutgoingCall, Self::CallRecording];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IncomingCall => "incomingCall",
            Self::OutgoingCall => "outgoingCall",
            Self::CallRecording => "callRecording",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RouterError::InvalidEventType(s.to_string()))
    }
}

/// Registration message as sent by a client.
///
/// Every field is optional at this layer so that a missing field turns into
/// a [`RegistrationError::MissingField`] naming it rather than a parse error.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    /// Always-unique handle.
    #[serde(default, alias = "agentId")]
    pub external_id: Option<String>,
    /// Routable address (phone number or the sentinel).
    #[serde(default, alias = "agentNumber")]
    pub identity: Option<String>,
    /// Human-readable name.
    #[serde(default, alias = "agentName")]
    pub display_name: Option<String>,
    /// Declared class.
    #[serde(default, alias = "agentType")]
    pub class: Option<String>,
}

/// Defaults applied to optional registration fields.
#[derive(Clone, Debug)]
pub struct RegistrationDefaults {
    /// Class used when none is declared.
    pub default_class: ConnectionClass,
    /// Display name template; `{identity}` is substituted.
    pub display_name_template: String,
}

impl Default for RegistrationDefaults {
    fn default() -> Self {
        Self {
            default_class: ConnectionClass::Generic,
            display_name_template: "Agent {identity}".to_string(),
        }
    }
}

/// A validated registration, ready for the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    /// Always-unique handle.
    pub external_id: String,
    /// Routable address.
    pub identity: String,
    /// Human-readable name.
    pub display_name: String,
    /// Declared class.
    pub class: ConnectionClass,
}

impl RegistrationRequest {
    /// Read a registration from the `data` of a client frame.
    pub fn from_value(value: serde_json::Value) -> Result<Self, RegistrationError> {
        serde_json::from_value(value).map_err(|e| RegistrationError::Malformed(e.to_string()))
    }

    /// Check required fields and fill in defaults.
    pub fn validate(self, defaults: &RegistrationDefaults) -> Result<Registration, RegistrationError> {
        let external_id =
            required(self.external_id).ok_or(RegistrationError::MissingField("externalId"))?;
        let identity = required(self.identity).ok_or(RegistrationError::MissingField("identity"))?;
        let display_name = required(self.display_name).unwrap_or_else(|| {
            defaults
                .display_name_template
                .replace("{identity}", &identity)
        });
        let class = match required(self.class) {
            Some(raw) => ConnectionClass::parse(&raw),
            None => defaults.default_class.clone(),
        };
        Ok(Registration {
            external_id,
            identity,
            display_name,
            class,
        })
    }
}

fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// How to resolve destinations for one delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutingTarget {
    /// Every registered entry.
    Broadcast,
    /// The entry owning one identity.
    ByIdentity(String),
    /// The entries owning any of these identities.
    ByIdentities(Vec<String>),
    /// The entry with this external id.
    ByExternalId(String),
    /// The entries with any of these external ids.
    ByExternalIds(Vec<String>),
}

impl RoutingTarget {
    /// Whether the target addresses specific connections (anything but broadcast).
    pub fn is_directed(&self) -> bool {
        !matches!(self, Self::Broadcast)
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast",
            Self::ByIdentity(_) => "identity",
            Self::ByIdentities(_) => "identities",
            Self::ByExternalId(_) => "external_id",
            Self::ByExternalIds(_) => "external_ids",
        }
    }
}
