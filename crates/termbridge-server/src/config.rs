//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use termbridge_proxy::ProxyConfig;

/// Configuration for the termbridge server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Interval between server-initiated Ping frames; `0` disables them.
    pub ping_interval_secs: u64,
    /// How long graceful shutdown waits for sessions to finish.
    pub shutdown_timeout_secs: u64,
    /// Backend command for each session (program followed by arguments).
    /// When unset, sessions echo frames back to the client.
    pub command: Option<Vec<String>>,
    /// Per-connection proxy settings.
    pub proxy: ProxyConfig,
}

impl ServerConfig {
    /// Ping interval, if enabled.
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_secs > 0).then(|| Duration::from_secs(self.ping_interval_secs))
    }

    /// Graceful shutdown timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 50,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            ping_interval_secs: 5,
            shutdown_timeout_secs: 30,
            command: None,
            proxy: ProxyConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_host() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
    }

    #[test]
    fn default_port_is_zero() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_max_connections() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_connections, 50);
    }

    #[test]
    fn default_max_message_size() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_message_size, 16 * 1024 * 1024);
    }

    #[test]
    fn pings_more_often_than_keepalive_timeout() {
        let cfg = ServerConfig::default();
        let keepalive = cfg.proxy.keepalive_timeout().unwrap();
        assert!(cfg.ping_interval().unwrap() < keepalive);
    }

    #[test]
    fn zero_ping_interval_disables_pings() {
        let cfg = ServerConfig {
            ping_interval_secs: 0,
            ..ServerConfig::default()
        };
        assert!(cfg.ping_interval().is_none());
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: 9090,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "0.0.0.0:9090");
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig {
            command: Some(vec!["/bin/sh".into(), "-i".into()]),
            ..ServerConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn deserialize_partial_json_string() {
        let json = r#"{"host":"10.0.0.1","port":3000,"proxy":{"queue_capacity":8}}"#;
        let cfg: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.host, "10.0.0.1");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.max_connections, 50);
        assert_eq!(cfg.proxy.queue_capacity, 8);
        assert_eq!(cfg.proxy.enqueue_timeout_ms, 5_000);
    }
}
