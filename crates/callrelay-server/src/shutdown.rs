//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default time allowed for sessions to drain before giving up.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared shutdown signal for the listener and every WebSocket session.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token observed by the listener and sessions.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fire the signal. Idempotent.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("shutdown requested");
        }
        self.token.cancel();
    }

    /// Whether the signal has fired.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the signal and wait up to `timeout` for `server` to finish.
    ///
    /// Returns `false` if the server task was still running at the deadline;
    /// it is aborted in that case.
    pub async fn drain(&self, server: JoinHandle<()>, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();
        let abort = server.abort_handle();
        if tokio::time::timeout(timeout, server).await.is_ok() {
            info!("server drained");
            true
        } else {
            warn!(?timeout, "server did not drain in time, aborting");
            abort.abort();
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn shutdown_reaches_every_token() {
        let coord = ShutdownCoordinator::new();
        let t1 = coord.token();
        let t2 = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }

    #[tokio::test]
    async fn drain_waits_for_cooperative_task() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let server = tokio::spawn(async move { token.cancelled().await });
        assert!(coord.drain(server, None).await);
    }

    #[tokio::test]
    async fn drain_times_out_and_aborts() {
        let coord = ShutdownCoordinator::new();
        let server = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        assert!(!coord.drain(server, Some(Duration::from_millis(50))).await);
        assert!(coord.is_shutting_down());
    }
}
