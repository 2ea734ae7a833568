//! Error types for the proxy and its transport boundary.

use thiserror::Error;

/// Failures reported by a transport (the client-facing socket).
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// WebSocket protocol or framing failure.
    #[error("websocket error: {0}")]
    WebSocket(String),
    /// The transport was already closed.
    #[error("transport closed")]
    Closed,
}

/// Errors surfaced to callers of the [`Proxy`](crate::Proxy) façade.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The proxy has been closed; no more frames can be sent.
    #[error("proxy closed")]
    Closed,
    /// The inbound queue has been closed and fully drained.
    #[error("end of stream")]
    EndOfStream,
    /// The owning context asked the proxy to stop.
    #[error("proxy cancelled")]
    Cancelled,
    /// The transport upgrade failed during construction.
    #[error("transport upgrade failed: {0}")]
    Upgrade(#[source] TransportError),
    /// A byte-stream operation was used while the reassembler is turned off.
    #[error("byte-stream reassembly is disabled")]
    ByteStreamDisabled,
}

impl ProxyError {
    /// Whether this error means the proxy is no longer usable because it closed
    /// (as opposed to cancellation or a construction failure).
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed | Self::EndOfStream)
    }
}

impl From<ProxyError> for std::io::Error {
    fn from(err: ProxyError) -> Self {
        let kind = match err {
            ProxyError::Closed | ProxyError::EndOfStream => std::io::ErrorKind::BrokenPipe,
            ProxyError::Cancelled => std::io::ErrorKind::Interrupted,
            ProxyError::Upgrade(_) => std::io::ErrorKind::ConnectionRefused,
            ProxyError::ByteStreamDisabled => std::io::ErrorKind::Unsupported,
        };
        std::io::Error::new(kind, err)
    }
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
