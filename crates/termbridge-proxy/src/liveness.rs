//! Application-level liveness tracking.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// When the peer was last seen alive.
///
/// Refreshed by the session handler whenever it observes a ping or pong;
/// the proxy itself never inspects frame contents.
#[derive(Debug)]
pub struct LivenessTracker {
    last_seen: Mutex<Instant>,
}

impl LivenessTracker {
    /// Tracker that considers the peer alive as of now.
    pub fn new() -> Self {
        Self {
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Record a liveness signal.
    pub fn refresh(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last liveness signal.
    pub fn elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of the keepalive loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepaliveResult {
    /// No liveness signal within the timeout.
    TimedOut,
    /// The loop was cancelled externally.
    Cancelled,
}

/// Run the keepalive check for one proxy.
///
/// Ticks every `timeout + 1s`, first tick one period after start. A tick that
/// finds the last signal older than `timeout` ends the loop with
/// [`KeepaliveResult::TimedOut`].
pub async fn run_keepalive(
    tracker: Arc<LivenessTracker>,
    timeout: Duration,
    cancel: CancellationToken,
) -> KeepaliveResult {
    let period = timeout + Duration::from_secs(1);
    let mut ticks = time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                let idle = tracker.elapsed();
                if idle > timeout {
                    warn!(?idle, ?timeout, "keepalive timeout");
                    return KeepaliveResult::TimedOut;
                }
            }
            () = cancel.cancelled() => {
                return KeepaliveResult::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn refresh_resets_elapsed() {
        let tracker = LivenessTracker::new();
        time::advance(Duration::from_secs(5)).await;
        assert!(tracker.elapsed() >= Duration::from_secs(5));
        tracker.refresh();
        assert!(tracker.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_refresh() {
        let tracker = Arc::new(LivenessTracker::new());
        let started = Instant::now();

        let result =
            run_keepalive(tracker, Duration::from_secs(2), CancellationToken::new()).await;

        assert_eq!(result, KeepaliveResult::TimedOut);
        // First tick lands at timeout + 1s.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn cancelled_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_keepalive(
            Arc::new(LivenessTracker::new()),
            Duration::from_secs(100),
            cancel,
        )
        .await;
        assert_eq!(result, KeepaliveResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn refreshed_peer_stays_alive() {
        let tracker = Arc::new(LivenessTracker::new());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_keepalive(
            tracker.clone(),
            Duration::from_secs(2),
            cancel.clone(),
        ));

        for _ in 0..10 {
            time::sleep(Duration::from_secs(1)).await;
            tracker.refresh();
        }

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), KeepaliveResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_signal_detected_at_next_tick() {
        let tracker = Arc::new(LivenessTracker::new());
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let handle = tokio::spawn(run_keepalive(
            tracker.clone(),
            Duration::from_secs(2),
            cancel,
        ));

        // Keep alive through the first tick (t=3s), then go silent.
        for _ in 0..3 {
            time::sleep(Duration::from_secs(1)).await;
            tracker.refresh();
        }

        assert_eq!(handle.await.unwrap(), KeepaliveResult::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }
}
