//! # termbridge-server
//!
//! Axum server that bridges each WebSocket client to a backend session
//! through a [`termbridge_proxy::Proxy`].
//!
//! - `GET /ws`: upgrade, start a proxy, run the configured [`SessionHandler`]
//! - `GET /health`: liveness and connection count
//! - `GET /metrics`: Prometheus exposition
//!
//! Settings are layered (defaults, JSON file, `TERMBRIDGE_*` env) and
//! shutdown is coordinated through a root cancellation token from which
//! every session's proxy token is derived.

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod settings;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::{ServerError, SessionError, SettingsError};
pub use server::TermbridgeServer;
pub use settings::{Settings, load_settings};
pub use shutdown::ShutdownCoordinator;
pub use websocket::handler::{CommandSession, EchoSession, SessionHandler};
pub use websocket::transport::{AcceptUpgrade, AxumTransport, TungsteniteTransport, WsTransport};
