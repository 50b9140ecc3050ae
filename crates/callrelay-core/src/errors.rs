//! Error taxonomy for the relay core.
//!
//! None of these are fatal: registration errors go back to the offending
//! connection only, router errors go back to the caller of `deliver`.

use thiserror::Error;

/// Which uniqueness rule a registration violated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictField {
    /// Another live entry already uses this `externalId`.
    ExternalId,
    /// Another live entry already owns this non-sentinel `identity`.
    Identity,
}

impl ConflictField {
    /// Wire name of the conflicting field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExternalId => "externalId",
            Self::Identity => "identity",
        }
    }
}

/// Uniqueness violation reported by [`crate::registry::IdentityRegistry::register`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{} '{value}' is already registered", .field.as_str())]
pub struct RegistryConflict {
    /// Conflicting field.
    pub field: ConflictField,
    /// Conflicting value.
    pub value: String,
}

/// Why a `Connected → Registered` transition was refused.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// A required field was absent or blank.
    #[error("{0} is required")]
    MissingField(&'static str),
    /// The registration payload could not be read.
    #[error("invalid registration payload: {0}")]
    Malformed(String),
    /// The registry refused the entry.
    #[error(transparent)]
    Conflict(#[from] RegistryConflict),
    /// The connection already owns an entry.
    #[error("connection is already registered as '{0}'")]
    AlreadyRegistered(String),
    /// The connection is not tracked (already closed or never connected).
    #[error("connection '{0}' is not open")]
    UnknownConnection(String),
}

impl RegistrationError {
    /// Field the error refers to, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::MissingField(field) => Some(*field),
            Self::Conflict(conflict) => Some(conflict.field.as_str()),
            _ => None,
        }
    }
}

/// Errors surfaced to callers of the event router.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    /// The event type is not one of `incomingCall`, `outgoingCall`, `callRecording`.
    #[error("invalid event type: {0}")]
    InvalidEventType(String),
}
