//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
    /// Whether a graceful shutdown is in progress.
    pub shutting_down: bool,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, shutting_down: bool) -> HealthResponse {
    HealthResponse {
        status: if shutting_down { "draining" } else { "ok" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        shutting_down,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0, false);
        assert_eq!(resp.status, "ok");
    }

    #[test]
    fn status_draining_during_shutdown() {
        let resp = health_check(Instant::now(), 3, true);
        assert_eq!(resp.status, "draining");
        assert_eq!(resp.connections, 3);
    }

    #[test]
    fn uptime_starts_at_zero() {
        let resp = health_check(Instant::now(), 0, false);
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn serializes_expected_fields() {
        let json = serde_json::to_value(health_check(Instant::now(), 1, false)).unwrap();
        assert!(json.get("status").is_some());
        assert!(json.get("uptime_secs").is_some());
        assert_eq!(json["connections"], 1);
    }
}
