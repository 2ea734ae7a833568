//! Transport boundary: the client-facing full-duplex framed socket.
//!
//! A [`Transport`] is split once into a [`FrameSource`] owned by the reader
//! task and a [`FrameSink`] owned by the writer task. [`Upgrade`] is the
//! fallible step that produces a transport from an inbound request.
//!
//! [`ChannelTransport`] is an in-memory implementation used by tests and by
//! embedders that want to drive a proxy without a socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::frame::Frame;

/// Receiving half of a transport.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Receive the next frame. `Ok(None)` means the peer closed cleanly.
    async fn recv_frame(&mut self) -> Result<Option<Frame>, TransportError>;
}

/// Sending half of a transport.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Transmit one frame.
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Close the transport. Called at most once by the proxy.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// A full-duplex framed socket that can be split into independent halves.
pub trait Transport: Send + 'static {
    /// Receiving half.
    type Source: FrameSource;
    /// Sending half.
    type Sink: FrameSink;

    /// Split into the receiving and sending halves.
    fn split(self) -> (Self::Source, Self::Sink);
}

/// The upgrade step that turns an inbound request into a [`Transport`].
#[async_trait]
pub trait Upgrade: Send {
    /// Transport produced on success.
    type Transport: Transport;

    /// Perform the upgrade.
    async fn upgrade(self) -> Result<Self::Transport, TransportError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory transport
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory transport backed by unbounded channels.
pub struct ChannelTransport {
    source: ChannelSource,
    sink: ChannelSink,
}

/// Receiving half of a [`ChannelTransport`].
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

/// Sending half of a [`ChannelTransport`].
pub struct ChannelSink {
    tx: Option<mpsc::UnboundedSender<Frame>>,
    closes: Arc<AtomicUsize>,
}

/// The remote end of a [`ChannelTransport`], playing the client.
pub struct ChannelPeer {
    to_proxy: Option<mpsc::UnboundedSender<Result<Frame, TransportError>>>,
    from_proxy: mpsc::UnboundedReceiver<Frame>,
    closes: Arc<AtomicUsize>,
}

impl ChannelTransport {
    /// Create a transport and the peer that drives it.
    pub fn pair() -> (Self, ChannelPeer) {
        let (to_proxy, rx) = mpsc::unbounded_channel();
        let (tx, from_proxy) = mpsc::unbounded_channel();
        let closes = Arc::new(AtomicUsize::new(0));
        let transport = Self {
            source: ChannelSource { rx },
            sink: ChannelSink {
                tx: Some(tx),
                closes: closes.clone(),
            },
        };
        let peer = ChannelPeer {
            to_proxy: Some(to_proxy),
            from_proxy,
            closes,
        };
        (transport, peer)
    }
}

impl Transport for ChannelTransport {
    type Source = ChannelSource;
    type Sink = ChannelSink;

    fn split(self) -> (ChannelSource, ChannelSink) {
        (self.source, self.sink)
    }
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        self.rx.recv().await.transpose()
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let _ = self.closes.fetch_add(1, Ordering::SeqCst);
        self.tx.take().map(drop).ok_or(TransportError::Closed)
    }
}

impl ChannelPeer {
    /// Deliver a frame to the proxy. Returns `false` once the proxy side is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.to_proxy
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(frame)).is_ok())
    }

    /// Make the proxy's next receive fail with `err`.
    pub fn fail(&self, err: TransportError) -> bool {
        self.to_proxy
            .as_ref()
            .is_some_and(|tx| tx.send(Err(err)).is_ok())
    }

    /// Close the client side cleanly; the proxy sees end-of-stream after
    /// draining frames already sent.
    pub fn hang_up(&mut self) {
        self.to_proxy = None;
    }

    /// Next frame transmitted by the proxy, or `None` once the transport closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_proxy.recv().await
    }

    /// Stop accepting frames from the proxy so its next transmit fails.
    pub fn stop_reading(&mut self) {
        self.from_proxy.close();
    }

    /// How many times the proxy closed the transport.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}
