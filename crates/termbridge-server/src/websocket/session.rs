//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use termbridge_proxy::{FrameKind, Proxy, ProxyConfig, Transport};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::handler::SessionHandler;
use crate::metrics::{
    SESSION_ERRORS_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Per-session settings taken from the server configuration.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Proxy configuration for the session.
    pub proxy: ProxyConfig,
    /// Interval between server-initiated Ping frames.
    pub ping_interval: Option<Duration>,
}

/// Run a session for a connected client.
///
/// 1. Starts a proxy over the transport on `cancel`
/// 2. Sends periodic Ping frames so the client's Pongs feed liveness
/// 3. Runs the handler until it returns
/// 4. Closes the proxy, waits for its tasks and records metrics
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session<T: Transport>(
    transport: T,
    client_id: String,
    handler: Arc<dyn SessionHandler>,
    cancel: CancellationToken,
    options: SessionOptions,
) {
    let connection_start = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let proxy = Proxy::spawn(transport, cancel, options.proxy);
    let pinger = options
        .ping_interval
        .map(|period| tokio::spawn(ping_loop(proxy.clone(), period)));

    if let Err(e) = handler.run(proxy.clone()).await {
        warn!(error = %e, "session handler failed");
        counter!(SESSION_ERRORS_TOTAL).increment(1);
    }

    // Clean up
    let _ = proxy.close();
    if let Some(pinger) = pinger {
        pinger.abort();
    }
    proxy.terminated().await;

    let reason = proxy.close_reason().map_or("unknown", |r| r.as_str());
    info!(reason, "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
}

/// Sends an empty Ping every `period` until the proxy closes.
async fn ping_loop(proxy: Proxy, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // Skip the immediate first tick
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            () = proxy.closed() => break,
            _ = ticker.tick() => {
                if proxy.send(FrameKind::PING, Vec::new()).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!("ping loop stopped");
}
