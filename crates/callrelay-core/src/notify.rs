//! Presence fan-out: tells registered connections about peers coming and going.
//!
//! The registry itself never notifies; the lifecycle manager calls into a
//! [`PresenceNotifier`] after each successful register or remove.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::envelope::{Envelope, ServerEvent};
use crate::registry::{IdentityRegistry, RegistryEntry};

/// Receives presence changes from the lifecycle manager.
pub trait PresenceNotifier: Send + Sync {
    /// `entry` just registered.
    fn peer_connected(&self, entry: &RegistryEntry);

    /// The entry `external_id` / `identity` just closed.
    fn peer_disconnected(&self, external_id: &str, identity: &str);
}

/// Sends presence envelopes to every other live registered connection.
pub struct RegistryFanout {
    registry: Arc<IdentityRegistry>,
}

impl RegistryFanout {
    /// Fan out over the entries of `registry`.
    pub fn new(registry: Arc<IdentityRegistry>) -> Self {
        Self { registry }
    }

    fn send_to_others(&self, except: &str, envelope: &Envelope) {
        let Some(json) = envelope.to_json() else {
            return;
        };
        let frame = Arc::new(json);
        let mut recipients = 0usize;
        for entry in self.registry.snapshot() {
            if entry.external_id == except {
                continue;
            }
            if entry.connection.send(Arc::clone(&frame)) {
                recipients += 1;
            }
        }
        debug!(event_type = %envelope.event_type, except, recipients, "presence fan-out");
    }
}

impl PresenceNotifier for RegistryFanout {
    fn peer_connected(&self, entry: &RegistryEntry) {
        let envelope = Envelope::new(
            ServerEvent::PeerConnected,
            json!({
                "externalId": entry.external_id,
                "identity": entry.identity,
                "displayName": entry.display_name,
                "class": entry.class,
            }),
        );
        self.send_to_others(&entry.external_id, &envelope);
    }

    fn peer_disconnected(&self, external_id: &str, identity: &str) {
        let envelope = Envelope::new(
            ServerEvent::PeerDisconnected,
            json!({ "externalId": external_id, "identity": identity }),
        );
        self.send_to_others(external_id, &envelope);
    }
}
