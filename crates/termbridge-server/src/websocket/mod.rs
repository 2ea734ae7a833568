//! WebSocket transports, session lifecycle and session handlers.

pub mod handler;
pub mod session;
pub mod transport;
