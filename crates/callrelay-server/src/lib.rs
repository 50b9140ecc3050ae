//! # callrelay-server
//!
//! Axum HTTP + `WebSocket` transport for the relay core.
//!
//! - `WebSocket` gateway: one session task per connection, registration
//!   frames, heartbeat, exactly-once close
//! - HTTP event API: `POST /api/{eventType}/...` turned into router calls
//! - Registry listing, `/health`, Prometheus `/metrics`
//! - Graceful shutdown via `CancellationToken`
//!
//! ## Crate Position
//!
//! Depends on: callrelay-core, callrelay-settings. Depended on by: callrelay.

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod websocket;
