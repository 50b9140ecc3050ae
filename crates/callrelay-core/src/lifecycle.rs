//! Connection lifecycle: `Connected → Registered → Closed`.
//!
//! The manager owns the side table `connection id → (handle, Option<externalId>)`.
//! Only the `Connected → Registered` transition is guarded (by the registry);
//! close is always allowed and runs its side effects exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::connection::ClientConnection;
use crate::envelope::{Envelope, ServerEvent};
use crate::errors::RegistrationError;
use crate::notify::PresenceNotifier;
use crate::registry::{IdentityRegistry, RegistryEntry};
use crate::telemetry::{RELAY_REGISTERED_ENTRIES, RELAY_REGISTRATIONS_TOTAL};
use crate::types::{RegistrationDefaults, RegistrationRequest};

/// Where a connection is in its lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport open, not yet registered.
    Connected,
    /// Bound to a registry entry.
    Registered {
        /// The owned entry's external id.
        external_id: String,
    },
    /// Terminal, or never seen.
    Closed,
}

struct Tracked {
    connection: Arc<ClientConnection>,
    external_id: Option<String>,
}

/// Drives per-connection state and presence notifications.
pub struct LifecycleManager {
    registry: Arc<IdentityRegistry>,
    notifier: Arc<dyn PresenceNotifier>,
    defaults: RegistrationDefaults,
    connections: Mutex<HashMap<String, Tracked>>,
    /// Taken before `connections` is released and held until the
    /// notification is sent, so observers see presence changes in registry
    /// order. Lock order: `connections` then `presence`.
    presence: Mutex<()>,
}

impl LifecycleManager {
    /// Create a manager over `registry`, announcing presence through `notifier`.
    pub fn new(
        registry: Arc<IdentityRegistry>,
        notifier: Arc<dyn PresenceNotifier>,
        defaults: RegistrationDefaults,
    ) -> Self {
        Self {
            registry,
            notifier,
            defaults,
            connections: Mutex::new(HashMap::new()),
            presence: Mutex::new(()),
        }
    }

    /// The registry this manager writes to.
    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    /// Start tracking a freshly opened connection.
    pub fn connect(&self, connection: Arc<ClientConnection>) {
        let id = connection.id.clone();
        let previous = self.connections.lock().insert(
            id.clone(),
            Tracked {
                connection,
                external_id: None,
            },
        );
        if previous.is_some() {
            warn!(conn_id = %id, "connection id reused; previous handle replaced");
        }
        debug!(conn_id = %id, "connection tracked");
    }

    /// Handle the `data` of a `register` frame.
    pub fn register_message(
        &self,
        conn_id: &str,
        data: Value,
    ) -> Result<RegistryEntry, RegistrationError> {
        match RegistrationRequest::from_value(data) {
            Ok(request) => self.register(conn_id, request),
            Err(err) => {
                self.reject(conn_id, &err);
                Err(err)
            }
        }
    }

    /// Attempt `Connected → Registered`.
    ///
    /// On success the connection receives `registrationSuccess` and every
    /// other registered connection receives `peerConnected`. On failure the
    /// connection receives `registrationError` and stays `Connected`.
    pub fn register(
        &self,
        conn_id: &str,
        request: RegistrationRequest,
    ) -> Result<RegistryEntry, RegistrationError> {
        match self.bind(conn_id, request) {
            Ok((entry, order)) => {
                self.acknowledge(&entry);
                self.notifier.peer_connected(&entry);
                drop(order);
                info!(
                    conn_id,
                    external_id = %entry.external_id,
                    identity = %entry.identity,
                    class = %entry.class,
                    "connection registered"
                );
                metrics::counter!(RELAY_REGISTRATIONS_TOTAL, "outcome" => "success").increment(1);
                metrics::gauge!(RELAY_REGISTERED_ENTRIES).set(self.registry.len() as f64);
                Ok(entry)
            }
            Err(err) => {
                self.reject(conn_id, &err);
                Err(err)
            }
        }
    }

    /// Validate and insert while holding the side table, so a concurrent
    /// close of the same connection either sees the binding or precedes it.
    /// Returns with the presence lock held.
    fn bind(
        &self,
        conn_id: &str,
        request: RegistrationRequest,
    ) -> Result<(RegistryEntry, MutexGuard<'_, ()>), RegistrationError> {
        let mut connections = self.connections.lock();
        let tracked = connections
            .get_mut(conn_id)
            .ok_or_else(|| RegistrationError::UnknownConnection(conn_id.to_string()))?;
        if let Some(existing) = &tracked.external_id {
            return Err(RegistrationError::AlreadyRegistered(existing.clone()));
        }
        let registration = request.validate(&self.defaults)?;
        let entry = self
            .registry
            .register(registration, Arc::clone(&tracked.connection))?;
        tracked.external_id = Some(entry.external_id.clone());
        let order = self.presence.lock();
        Ok((entry, order))
    }

    fn acknowledge(&self, entry: &RegistryEntry) {
        let (external_ids, identities) = self.registry.registered_keys();
        let envelope = Envelope::new(
            ServerEvent::RegistrationSuccess,
            json!({
                "externalId": entry.external_id,
                "identity": entry.identity,
                "displayName": entry.display_name,
                "class": entry.class,
                "registeredExternalIds": external_ids,
                "registeredIdentities": identities,
            }),
        );
        let _ = entry.connection.send_envelope(&envelope);
    }

    fn reject(&self, conn_id: &str, err: &RegistrationError) {
        warn!(conn_id, error = %err, "registration rejected");
        let outcome = match err {
            RegistrationError::Conflict(_) => "conflict",
            RegistrationError::MissingField(_) | RegistrationError::Malformed(_) => "invalid",
            RegistrationError::AlreadyRegistered(_) | RegistrationError::UnknownConnection(_) => {
                "refused"
            }
        };
        metrics::counter!(RELAY_REGISTRATIONS_TOTAL, "outcome" => outcome).increment(1);
        let Some(connection) = self.connection(conn_id) else {
            return;
        };
        let envelope = Envelope::new(
            ServerEvent::RegistrationError,
            json!({ "message": err.to_string(), "field": err.field() }),
        );
        let _ = connection.send_envelope(&envelope);
    }

    /// `* → Closed`. Deregisters and notifies peers if the connection was
    /// registered. Later calls for the same id are no-ops.
    pub fn close(&self, conn_id: &str) -> Option<RegistryEntry> {
        let (entry, order) = {
            let mut connections = self.connections.lock();
            let tracked = connections.remove(conn_id)?;
            let removed = tracked
                .external_id
                .and_then(|external_id| self.registry.remove(&external_id));
            let Some(entry) = removed else {
                debug!(conn_id, "unregistered connection closed");
                return None;
            };
            (entry, self.presence.lock())
        };
        self.notifier
            .peer_disconnected(&entry.external_id, &entry.identity);
        drop(order);
        metrics::gauge!(RELAY_REGISTERED_ENTRIES).set(self.registry.len() as f64);
        info!(
            conn_id,
            external_id = %entry.external_id,
            identity = %entry.identity,
            "registered connection closed"
        );
        Some(entry)
    }

    /// Current state of `conn_id`.
    pub fn state(&self, conn_id: &str) -> ConnectionState {
        match self.connections.lock().get(conn_id) {
            None => ConnectionState::Closed,
            Some(Tracked {
                external_id: None, ..
            }) => ConnectionState::Connected,
            Some(Tracked {
                external_id: Some(external_id),
                ..
            }) => ConnectionState::Registered {
                external_id: external_id.clone(),
            },
        }
    }

    /// Handle of a tracked connection.
    pub fn connection(&self, conn_id: &str) -> Option<Arc<ClientConnection>> {
        self.connections
            .lock()
            .get(conn_id)
            .map(|t| Arc::clone(&t.connection))
    }

    /// Number of open connections, registered or not.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Ask every open connection to close.
    pub fn close_all(&self) {
        for tracked in self.connections.lock().values() {
            tracked.connection.request_close();
        }
    }
}
