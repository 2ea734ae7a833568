//! Frames relayed by the proxy.

use std::fmt;

use bytes::Bytes;

/// Opaque frame kind tag, forwarded verbatim between transport and session.
///
/// The named constants follow WebSocket opcodes, which is what every bundled
/// transport speaks; other transports may use any value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameKind(pub u8);

impl FrameKind {
    /// UTF-8 text data.
    pub const TEXT: Self = Self(1);
    /// Binary data.
    pub const BINARY: Self = Self(2);
    /// Close handshake.
    pub const CLOSE: Self = Self(8);
    /// Ping control frame.
    pub const PING: Self = Self(9);
    /// Pong control frame.
    pub const PONG: Self = Self(10);

    /// Raw tag value.
    pub fn code(self) -> u8 {
        self.0
    }

    /// Text or binary payload (as opposed to a control frame).
    pub fn is_data(self) -> bool {
        self == Self::TEXT || self == Self::BINARY
    }

    /// Ping or pong.
    pub fn is_heartbeat(self) -> bool {
        self == Self::PING || self == Self::PONG
    }
}

impl fmt::Debug for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::TEXT => f.write_str("Text"),
            Self::BINARY => f.write_str("Binary"),
            Self::CLOSE => f.write_str("Close"),
            Self::PING => f.write_str("Ping"),
            Self::PONG => f.write_str("Pong"),
            Self(other) => write!(f, "FrameKind({other})"),
        }
    }
}

/// One discrete unit delivered by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Kind tag.
    pub kind: FrameKind,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame.
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Text frame.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::TEXT, payload)
    }

    /// Binary frame.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::BINARY, payload)
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
