//! Outbound handle for one live transport session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::envelope::Envelope;

/// Represents a connected relay client.
///
/// The core never touches the socket directly: frames are queued on a
/// bounded channel drained by the transport's writer task.
pub struct ClientConnection {
    /// Unique transport-assigned connection ID.
    pub id: String,
    /// Send channel to the client's write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established (monotonic).
    pub connected_at: Instant,
    /// When this connection was established (wall clock).
    pub connected_at_utc: DateTime<Utc>,
    /// Whether the client has responded to the last ping.
    pub is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to a full or closed channel.
    pub dropped_messages: AtomicU64,
    /// Cancelled when someone asks the transport session to end.
    close: CancellationToken,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            connected_at_utc: Utc::now(),
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            close: CancellationToken::new(),
        }
    }

    /// Queue a serialized frame for the client.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize an envelope and queue it.
    pub fn send_envelope(&self, envelope: &Envelope) -> bool {
        match envelope.to_json() {
            Some(json) => self.send(Arc::new(json)),
            None => false,
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Ask the owning transport session to shut this connection down.
    pub fn request_close(&self) {
        self.close.cancel();
    }

    /// Whether a close has been requested.
    pub fn is_closing(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Resolves once [`request_close`](Self::request_close) has been called.
    pub async fn closed(&self) {
        self.close.cancelled().await;
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("connected_at_utc", &self.connected_at_utc)
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}
