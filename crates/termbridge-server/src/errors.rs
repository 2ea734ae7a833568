//! Error types for the server, its settings and session handlers.

use std::net::SocketAddr;

use termbridge_proxy::ProxyError;
use thiserror::Error;

/// Errors that can occur when loading or parsing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the settings file.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while running a session handler.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The proxy reported a failure.
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    /// I/O failure while bridging a backend.
    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The backend command could not be started.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listening socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Reading the bound address failed.
    #[error("listener address unavailable: {0}")]
    LocalAddr(std::io::Error),
    /// The Prometheus recorder could not be installed.
    #[error("metrics recorder: {0}")]
    Metrics(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Convenience for logging the bound address.
pub(crate) fn describe(addr: &SocketAddr) -> String {
    format!("ws://{addr}/ws")
}
