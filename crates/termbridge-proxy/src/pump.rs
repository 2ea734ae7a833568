//! The reader, writer and keepalive tasks that run for every proxy.
//!
//! Each task returns the [`CloseReason`] that ended it and closes the proxy on
//! exit; only the first close wins.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, trace, warn};

use crate::frame::Frame;
use crate::liveness::{KeepaliveResult, run_keepalive};
use crate::proxy::{CloseReason, Proxy};
use crate::transport::{FrameSink, FrameSource};

/// Upper bound on flushing queued frames, and separately on closing the
/// transport.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Transport → inbound queue.
pub(crate) async fn read_pump<S: FrameSource>(
    proxy: Proxy,
    mut source: S,
    inbound: mpsc::Sender<Frame>,
) {
    let reason = read_loop(&proxy, &mut source, &inbound).await;
    debug!(%reason, "reader stopped");
    drop(inbound);
    let _ = proxy.close_with(reason);
}

async fn read_loop<S: FrameSource>(
    proxy: &Proxy,
    source: &mut S,
    inbound: &mpsc::Sender<Frame>,
) -> CloseReason {
    let shutdown = proxy.shutdown_token();
    let enqueue_timeout = proxy.config().enqueue_timeout();

    loop {
        let received = tokio::select! {
            biased;
            () = shutdown.cancelled() => return proxy.stop_reason(),
            received = source.recv_frame() => received,
        };

        let frame = match received {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("peer closed transport");
                return CloseReason::PeerClosed;
            }
            Err(e) => {
                warn!(error = %e, "transport receive failed");
                return CloseReason::Transport;
            }
        };
        trace!(kind = ?frame.kind, len = frame.len(), "frame received");

        tokio::select! {
            biased;
            () = shutdown.cancelled() => return proxy.stop_reason(),
            sent = time::timeout(enqueue_timeout, inbound.send(frame)) => match sent {
                Ok(Ok(())) => {}
                // Receiver closed: the proxy is already shutting down.
                Ok(Err(_)) => return proxy.stop_reason(),
                Err(_) => {
                    warn!(timeout = ?enqueue_timeout, "inbound queue full, consumer unresponsive");
                    return CloseReason::Backpressure;
                }
            },
        }
    }
}

/// Outbound queue → transport. Owns the transport's close.
pub(crate) async fn write_pump<K: FrameSink>(
    proxy: Proxy,
    mut sink: K,
    mut outbound: mpsc::Receiver<Frame>,
) {
    let reason = write_loop(&proxy, &mut sink, &mut outbound).await;
    debug!(%reason, "writer stopped");
    outbound.close();

    let flush = reason != CloseReason::Transport && !proxy.is_cancelled();
    if flush
        && time::timeout(CLOSE_GRACE, drain_queued(&mut sink, &mut outbound))
            .await
            .is_err()
    {
        warn!(grace = ?CLOSE_GRACE, "flush timed out, dropping queued frames");
    }

    // The close runs even when the flush was cut short.
    match time::timeout(CLOSE_GRACE, sink.close()).await {
        Ok(Ok(())) => debug!("transport closed"),
        Ok(Err(e)) => debug!(error = %e, "transport close failed"),
        Err(_) => warn!(grace = ?CLOSE_GRACE, "transport close timed out"),
    }

    let _ = proxy.close_with(reason);
}

async fn write_loop<K: FrameSink>(
    proxy: &Proxy,
    sink: &mut K,
    outbound: &mut mpsc::Receiver<Frame>,
) -> CloseReason {
    let shutdown = proxy.shutdown_token();

    loop {
        let frame = tokio::select! {
            biased;
            () = shutdown.cancelled() => return proxy.stop_reason(),
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => return proxy.stop_reason(),
            },
        };
        trace!(kind = ?frame.kind, len = frame.len(), "frame transmitting");

        // A frame already dequeued goes out unless the transport is stuck.
        tokio::select! {
            biased;
            sent = sink.send_frame(frame) => {
                if let Err(e) = sent {
                    warn!(error = %e, "transport send failed");
                    return CloseReason::Transport;
                }
            }
            () = shutdown.cancelled() => return proxy.stop_reason(),
        }
    }
}

/// Best-effort send of frames that were queued before the close.
async fn drain_queued<K: FrameSink>(sink: &mut K, outbound: &mut mpsc::Receiver<Frame>) {
    while let Ok(frame) = outbound.try_recv() {
        if sink.send_frame(frame).await.is_err() {
            break;
        }
    }
}

/// Liveness check; closes the proxy when the peer goes quiet.
pub(crate) async fn keepalive_pump(proxy: Proxy, timeout: Duration) {
    let result = run_keepalive(proxy.liveness(), timeout, proxy.shutdown_token()).await;
    let reason = match result {
        KeepaliveResult::TimedOut => CloseReason::LivenessTimeout,
        KeepaliveResult::Cancelled => proxy.stop_reason(),
    };
    let _ = proxy.close_with(reason);
}
