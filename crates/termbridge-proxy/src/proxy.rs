//! The connection proxy façade.
//!
//! A [`Proxy`] owns one transport and three background tasks (reader, writer,
//! optional keepalive). Session handlers talk to it through [`Proxy::recv`] /
//! [`Proxy::send`] for frames, or [`Proxy::handle_input`] /
//! [`Proxy::load_buffers`] for caller-sized byte reads.
//!
//! The proxy is either alive or closed. Closing is a single compare-and-swap on
//! the status; whoever wins records the [`CloseReason`] and fires the shutdown
//! token that every task and blocked caller is watching.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::frame::{Frame, FrameKind};
use crate::liveness::LivenessTracker;
use crate::pump;
use crate::reassembly::StreamBuffer;
use crate::transport::{Transport, Upgrade};

const ALIVE: u8 = 0;
const CLOSED: u8 = 1;

/// Why a proxy was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called explicitly.
    Requested,
    /// The peer closed the transport.
    PeerClosed,
    /// A transport receive or send failed.
    Transport,
    /// The inbound queue stayed full past the enqueue timeout.
    Backpressure,
    /// No liveness signal within the keepalive timeout.
    LivenessTimeout,
    /// The owning context was cancelled.
    Cancelled,
}

impl CloseReason {
    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::PeerClosed => "peer_closed",
            Self::Transport => "transport",
            Self::Backpressure => "backpressure",
            Self::LivenessTimeout => "liveness_timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Shared {
    config: ProxyConfig,
    status: AtomicU8,
    close_reason: OnceLock<CloseReason>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Frame>>,
    outbound: mpsc::Sender<Frame>,
    liveness: Arc<LivenessTracker>,
    pending: Mutex<StreamBuffer>,
    /// Owner's cancellation.
    cancel: CancellationToken,
    /// Child of `cancel`; fired on close.
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

/// Handle to a running connection proxy. Cheap to clone.
#[derive(Clone)]
pub struct Proxy {
    shared: Arc<Shared>,
}

impl Proxy {
    /// Perform the transport upgrade and start the proxy on the result.
    pub async fn connect<U: Upgrade>(
        upgrade: U,
        cancel: CancellationToken,
        config: ProxyConfig,
    ) -> Result<Self> {
        let transport = upgrade.upgrade().await.map_err(|e| {
            debug!(error = %e, "transport upgrade failed");
            ProxyError::Upgrade(e)
        })?;
        Ok(Self::spawn(transport, cancel, config))
    }

    /// Start a proxy over an already-upgraded transport.
    ///
    /// The reader, writer and (when configured) keepalive tasks are running
    /// when this returns. Must be called within a Tokio runtime.
    pub fn spawn<T: Transport>(transport: T, cancel: CancellationToken, config: ProxyConfig) -> Self {
        let (source, sink) = transport.split();
        let capacity = config.capacity();
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let keepalive = config.keepalive_timeout();

        let proxy = Self {
            shared: Arc::new(Shared {
                config,
                status: AtomicU8::new(ALIVE),
                close_reason: OnceLock::new(),
                inbound: tokio::sync::Mutex::new(inbound_rx),
                outbound: outbound_tx,
                liveness: Arc::new(LivenessTracker::new()),
                pending: Mutex::new(StreamBuffer::new()),
                shutdown: cancel.child_token(),
                cancel,
                tasks: TaskTracker::new(),
            }),
        };

        let tasks = &proxy.shared.tasks;
        let _ = tasks.spawn(pump::read_pump(proxy.clone(), source, inbound_tx));
        let _ = tasks.spawn(pump::write_pump(proxy.clone(), sink, outbound_rx));
        if let Some(timeout) = keepalive {
            let _ = tasks.spawn(pump::keepalive_pump(proxy.clone(), timeout));
        }
        let _ = tasks.close();

        debug!(capacity, ?keepalive, "proxy started");
        proxy
    }

    // ── Message surface ─────────────────────────────────────────────────

    /// Next inbound frame.
    ///
    /// Blocks until a frame arrives, the inbound stream ends
    /// ([`ProxyError::EndOfStream`]) or the owner cancels
    /// ([`ProxyError::Cancelled`]). Frames queued before a close are still
    /// delivered.
    pub async fn recv(&self) -> Result<Frame> {
        let mut inbound = self.shared.inbound.lock().await;
        tokio::select! {
            biased;
            () = self.shared.cancel.cancelled() => return Err(ProxyError::Cancelled),
            frame = inbound.recv() => return frame.ok_or(ProxyError::EndOfStream),
            () = self.shared.shutdown.cancelled() => {}
        }
        inbound.try_recv().map_err(|_| ProxyError::EndOfStream)
    }

    /// Queue a frame for transmission.
    ///
    /// Blocks while the outbound queue is full. Fails with
    /// [`ProxyError::Closed`] once the proxy is closed and with
    /// [`ProxyError::Cancelled`] if the owner cancels first.
    pub async fn send(&self, kind: FrameKind, payload: impl Into<Bytes>) -> Result<()> {
        if self.is_closed() {
            return Err(ProxyError::Closed);
        }
        let frame = Frame::new(kind, payload);
        tokio::select! {
            biased;
            () = self.shared.cancel.cancelled() => Err(ProxyError::Cancelled),
            () = self.shared.shutdown.cancelled() => Err(ProxyError::Closed),
            sent = self.shared.outbound.send(frame) => sent.map_err(|_| ProxyError::Closed),
        }
    }

    // ── Byte-stream surface ─────────────────────────────────────────────

    /// Copy up to `dst.len()` buffered bytes into `dst`. Never blocks;
    /// returns 0 when nothing is buffered.
    pub fn load_buffers(&self, dst: &mut [u8]) -> Result<usize> {
        self.ensure_byte_stream()?;
        Ok(self.shared.pending.lock().load(dst))
    }

    /// Buffer `chunk`, then fill `dst` from the buffer like
    /// [`load_buffers`](Self::load_buffers). Excess stays buffered.
    pub fn handle_input(&self, dst: &mut [u8], chunk: &[u8]) -> Result<usize> {
        self.ensure_byte_stream()?;
        Ok(self.shared.pending.lock().feed(dst, chunk))
    }

    /// Bytes buffered but not yet read.
    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().len()
    }

    fn ensure_byte_stream(&self) -> Result<()> {
        if self.shared.config.byte_stream {
            Ok(())
        } else {
            Err(ProxyError::ByteStreamDisabled)
        }
    }

    // ── Liveness ────────────────────────────────────────────────────────

    /// Record that the peer just proved it is alive (ping/pong observed).
    pub fn refresh_liveness(&self) {
        self.shared.liveness.refresh();
    }

    /// Time since the last liveness signal.
    pub fn liveness_elapsed(&self) -> Duration {
        self.shared.liveness.elapsed()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Close the proxy. Idempotent; returns `true` only for the call that
    /// actually performed the close.
    pub fn close(&self) -> bool {
        self.close_with(CloseReason::Requested)
    }

    pub(crate) fn close_with(&self, reason: CloseReason) -> bool {
        if self
            .shared
            .status
            .compare_exchange(ALIVE, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let _ = self.shared.close_reason.set(reason);
        info!(%reason, "proxy closed");

        // A blocked `recv` holds the lock; the reader stops enqueueing on
        // shutdown regardless.
        if let Ok(mut inbound) = self.shared.inbound.try_lock() {
            inbound.close();
        }
        self.shared.shutdown.cancel();
        true
    }

    /// Whether the proxy has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.status.load(Ordering::Acquire) == CLOSED
    }

    /// Whether the owner's cancellation has fired.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// The cause of the close, once closed.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.close_reason.get().copied()
    }

    /// Wait until shutdown has been signalled (close or cancellation).
    pub async fn closed(&self) {
        self.shared.shutdown.cancelled().await;
    }

    /// Wait until every background task has finished and the transport is
    /// closed.
    pub async fn terminated(&self) {
        self.shared.tasks.wait().await;
    }

    /// Configuration this proxy runs with.
    pub fn config(&self) -> &ProxyConfig {
        &self.shared.config
    }

    // ── Task plumbing ───────────────────────────────────────────────────

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shared.shutdown.clone()
    }

    pub(crate) fn liveness(&self) -> Arc<LivenessTracker> {
        self.shared.liveness.clone()
    }

    pub(crate) fn outbound(&self) -> mpsc::Sender<Frame> {
        self.shared.outbound.clone()
    }

    /// Reason to record when a task stops because shutdown was signalled.
    pub(crate) fn stop_reason(&self) -> CloseReason {
        if self.is_cancelled() {
            CloseReason::Cancelled
        } else {
            CloseReason::Requested
        }
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("closed", &self.is_closed())
            .field("close_reason", &self.close_reason())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}
