//! # callrelay-core
//!
//! Identity-addressed event relay: the part of the system with real
//! invariants to protect.
//!
//! - **Registry**: [`registry::IdentityRegistry`], the concurrent
//!   `externalId` ↔ entry and `identity` → `externalId` index
//! - **Lifecycle**: [`lifecycle::LifecycleManager`], the
//!   `Connected → Registered → Closed` state machine per connection
//! - **Router**: [`router::EventRouter`], target resolution, class-based
//!   payload shaping and shadow delivery to logging sinks
//! - **Reporting**: [`report::DeliveryResult`], per-target outcome of one delivery
//! - **Connection**: [`connection::ClientConnection`], the transport-agnostic
//!   outbound handle for one live session
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by: callrelay-settings, callrelay-server, callrelay.

#![deny(unsafe_code)]

pub mod connection;
pub mod envelope;
pub mod errors;
pub mod lifecycle;
pub mod logging;
pub mod notify;
pub mod registry;
pub mod report;
pub mod router;
pub mod shaping;
pub mod telemetry;
pub mod types;

pub use connection::ClientConnection;
pub use errors::{ConflictField, RegistrationError, RegistryConflict, RouterError};
pub use lifecycle::{ConnectionState, LifecycleManager};
pub use notify::{PresenceNotifier, RegistryFanout};
pub use registry::{IdentityRegistry, RegistryEntry};
pub use report::DeliveryResult;
pub use router::EventRouter;
pub use types::{
    ConnectionClass, EventType, Registration, RegistrationDefaults, RegistrationRequest,
    RoutingTarget,
};
