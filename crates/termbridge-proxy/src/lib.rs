//! # termbridge-proxy
//!
//! Connection proxy between a client-facing duplex socket (typically a
//! browser terminal's WebSocket) and a backend interactive session.
//!
//! - Reader and writer tasks decouple inbound and outbound traffic through
//!   bounded queues
//! - A slow consumer is treated as a dead peer (enqueue timeout)
//! - Optional keepalive closes the proxy when liveness signals stop
//! - Frames are exposed as messages ([`Proxy::recv`] / [`Proxy::send`]) or as a
//!   byte stream ([`Proxy::handle_input`], [`ProxyStream`])

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod frame;
pub mod liveness;
pub mod reassembly;
pub mod transport;

mod proxy;
mod pump;
mod stream;

pub use config::ProxyConfig;
pub use error::{ProxyError, Result, TransportError};
pub use frame::{Frame, FrameKind};
pub use proxy::{CloseReason, Proxy};
pub use stream::ProxyStream;
pub use transport::{FrameSink, FrameSource, Transport, Upgrade};
