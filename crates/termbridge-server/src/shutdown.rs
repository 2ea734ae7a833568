//! Graceful shutdown coordination via `CancellationToken`.
//!
//! The coordinator owns the root token. Every session's proxy runs on a child
//! token, so cancelling the root closes all proxies; session futures are
//! tracked so shutdown can wait for them to drain.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// Default timeout for graceful shutdown before giving up on sessions.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates graceful shutdown across the listener and all sessions.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// Get a clone of the root cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Token for one session; cancelled with the root.
    pub fn session_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Wrap a session future so shutdown waits for it.
    pub fn track<F: Future>(&self, session: F) -> TrackedFuture<F> {
        self.sessions.track_future(session)
    }

    /// Number of tracked sessions still running.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel everything and wait up to `timeout` for sessions to finish.
    ///
    /// Returns `true` if every session finished in time.
    pub async fn graceful_shutdown(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        let _ = self.sessions.close();
        info!(
            session_count = self.sessions.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for sessions to complete"
        );

        if tokio::time::timeout(timeout, self.sessions.wait()).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, some sessions may still be running");
            return false;
        }
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        assert_eq!(coord.active_sessions(), 0);
    }

    #[test]
    fn shutdown_cancels_session_tokens() {
        let coord = ShutdownCoordinator::new();
        let s1 = coord.session_token();
        let s2 = coord.session_token();
        coord.shutdown();
        assert!(s1.is_cancelled());
        assert!(s2.is_cancelled());
    }

    #[test]
    fn cancelling_one_session_leaves_root_alive() {
        let coord = ShutdownCoordinator::new();
        let session = coord.session_token();
        session.cancel();
        assert!(!coord.is_shutting_down());
        assert!(!coord.session_token().is_cancelled());
    }

    #[test]
    fn multiple_shutdown_calls_idempotent() {
        let coord = ShutdownCoordinator::new();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn tracked_sessions_counted() {
        let coord = ShutdownCoordinator::new();
        let token = coord.session_token();
        let handle = tokio::spawn(coord.track(async move { token.cancelled().await }));
        assert_eq!(coord.active_sessions(), 1);

        coord.shutdown();
        handle.await.unwrap();
        assert_eq!(coord.active_sessions(), 0);
    }

    #[tokio::test]
    async fn graceful_shutdown_awaits_sessions() {
        let coord = ShutdownCoordinator::new();
        let token = coord.session_token();
        let _handle = tokio::spawn(coord.track(async move { token.cancelled().await }));

        assert!(coord.graceful_shutdown(None).await);
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn graceful_shutdown_times_out() {
        let coord = ShutdownCoordinator::new();

        // A session that ignores cancellation
        let _handle = tokio::spawn(coord.track(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        }));

        let drained = coord
            .graceful_shutdown(Some(Duration::from_millis(100)))
            .await;
        assert!(!drained);
    }
}
