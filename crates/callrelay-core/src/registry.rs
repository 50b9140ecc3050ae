//! Identity registry: the `externalId` ↔ entry map and the
//! `identity` → `externalId` index, kept in lock-step behind one lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::connection::ClientConnection;
use crate::errors::{ConflictField, RegistryConflict};
use crate::types::{ConnectionClass, Registration};

/// Association between a live connection and its registration.
#[derive(Clone, Debug)]
pub struct RegistryEntry {
    /// Always-unique handle.
    pub external_id: String,
    /// Routable address.
    pub identity: String,
    /// Human-readable name.
    pub display_name: String,
    /// Declared class.
    pub class: ConnectionClass,
    /// Owning connection.
    pub connection: Arc<ClientConnection>,
    /// When the registration was accepted.
    pub registered_at: DateTime<Utc>,
}

/// Serializable view of an entry, without the connection handle.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EntrySummary {
    /// Always-unique handle.
    pub external_id: String,
    /// Routable address.
    pub identity: String,
    /// Human-readable name.
    pub display_name: String,
    /// Declared class.
    pub class: ConnectionClass,
    /// Connection id.
    pub connection_id: String,
    /// Connection time, RFC 3339.
    pub connected_at: String,
    /// Registration time, RFC 3339.
    pub registered_at: String,
}

impl RegistryEntry {
    /// Summary for listings and notifications.
    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            external_id: self.external_id.clone(),
            identity: self.identity.clone(),
            display_name: self.display_name.clone(),
            class: self.class.clone(),
            connection_id: self.connection.id.clone(),
            connected_at: self.connection.connected_at_utc.to_rfc3339(),
            registered_at: self.registered_at.to_rfc3339(),
        }
    }
}

#[derive(Default)]
struct Inner {
    /// Live entries in registration order.
    entries: IndexMap<String, RegistryEntry>,
    /// Non-sentinel identity → owning external id.
    identities: HashMap<String, String>,
}

/// Concurrent registry of live registrations.
///
/// All mutations and reads go through a single `RwLock`; a snapshot never
/// observes a half-applied register or remove.
pub struct IdentityRegistry {
    inner: RwLock<Inner>,
    sentinel: String,
}

impl IdentityRegistry {
    /// Create an empty registry exempting `sentinel` from identity uniqueness.
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            sentinel: sentinel.into(),
        }
    }

    /// The identity exempt from uniqueness.
    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Whether `identity` is the sentinel.
    pub fn is_sentinel(&self, identity: &str) -> bool {
        identity == self.sentinel
    }

    /// Insert an entry for `connection`.
    ///
    /// Fails if `externalId` is live, or if a non-sentinel `identity` is
    /// already owned by another entry.
    pub fn register(
        &self,
        registration: Registration,
        connection: Arc<ClientConnection>,
    ) -> Result<RegistryEntry, RegistryConflict> {
        let mut inner = self.inner.write();
        if inner.entries.contains_key(&registration.external_id) {
            return Err(RegistryConflict {
                field: ConflictField::ExternalId,
                value: registration.external_id,
            });
        }
        let indexed = !self.is_sentinel(&registration.identity);
        if indexed && inner.identities.contains_key(&registration.identity) {
            return Err(RegistryConflict {
                field: ConflictField::Identity,
                value: registration.identity,
            });
        }

        let entry = RegistryEntry {
            external_id: registration.external_id,
            identity: registration.identity,
            display_name: registration.display_name,
            class: registration.class,
            connection,
            registered_at: Utc::now(),
        };
        if indexed {
            let _ = inner
                .identities
                .insert(entry.identity.clone(), entry.external_id.clone());
        }
        let _ = inner.entries.insert(entry.external_id.clone(), entry.clone());
        debug!(
            external_id = %entry.external_id,
            identity = %entry.identity,
            class = %entry.class,
            total = inner.entries.len(),
            "registry entry added"
        );
        Ok(entry)
    }

    /// Remove the entry for `external_id` and its index row. No-op if absent.
    pub fn remove(&self, external_id: &str) -> Option<RegistryEntry> {
        let mut inner = self.inner.write();
        let entry = inner.entries.shift_remove(external_id)?;
        if inner.identities.get(&entry.identity).map(String::as_str) == Some(external_id) {
            let _ = inner.identities.remove(&entry.identity);
        }
        debug!(
            external_id,
            identity = %entry.identity,
            total = inner.entries.len(),
            "registry entry removed"
        );
        Some(entry)
    }

    /// Entry with this external id.
    pub fn lookup_by_external_id(&self, external_id: &str) -> Option<RegistryEntry> {
        self.inner.read().entries.get(external_id).cloned()
    }

    /// Entry owning this identity. The sentinel never resolves.
    pub fn lookup_by_identity(&self, identity: &str) -> Option<RegistryEntry> {
        let inner = self.inner.read();
        let external_id = inner.identities.get(identity)?;
        inner.entries.get(external_id).cloned()
    }

    /// All entries in registration order, taken under one read lock.
    pub fn snapshot(&self) -> Vec<RegistryEntry> {
        self.inner.read().entries.values().cloned().collect()
    }

    /// Registered external ids and non-sentinel identities, in registration order.
    pub fn registered_keys(&self) -> (Vec<String>, Vec<String>) {
        let inner = self.inner.read();
        let external_ids = inner.entries.keys().cloned().collect();
        let identities = inner
            .entries
            .values()
            .filter(|e| !self.is_sentinel(&e.identity))
            .map(|e| e.identity.clone())
            .collect();
        (external_ids, identities)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Verify the index matches the entry set exactly.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        let inner = self.inner.read();
        let mut expected = HashMap::new();
        for (key, entry) in &inner.entries {
            if key != &entry.external_id {
                return Err(format!("entry keyed '{key}' holds '{}'", entry.external_id));
            }
            if self.is_sentinel(&entry.identity) {
                continue;
            }
            if expected
                .insert(entry.identity.clone(), entry.external_id.clone())
                .is_some()
            {
                return Err(format!("identity '{}' owned twice", entry.identity));
            }
        }
        if expected != inner.identities {
            return Err(format!(
                "index out of step: expected {expected:?}, found {:?}",
                inner.identities
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("sentinel", &self.sentinel)
            .field("entries", &self.len())
            .finish()
    }
}
