//! WebSocket transports for the proxy.
//!
//! [`WsTransport`] adapts any split-able WebSocket stream whose message type
//! implements [`WsMessage`]. Two are wired up: axum's server-side
//! [`WebSocket`] and tokio-tungstenite's [`WebSocketStream`], the latter
//! with an [`AcceptUpgrade`] that performs the handshake on a raw stream.

use std::fmt::Display;

use async_trait::async_trait;
use axum::extract::ws::{self, WebSocket};
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, Stream, StreamExt};
use termbridge_proxy::{Frame, FrameKind, FrameSink, FrameSource, Transport, TransportError, Upgrade};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, protocol::CloseFrame, protocol::frame::coding::CloseCode};
use tracing::trace;

/// Transport over axum's server-side socket.
pub type AxumTransport = WsTransport<WebSocket>;

/// Transport over a tokio-tungstenite stream.
pub type TungsteniteTransport<S> = WsTransport<WebSocketStream<S>>;

/// What an inbound WebSocket message means to the proxy.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Relay this frame.
    Frame(Frame),
    /// The peer started the close handshake.
    Close,
    /// Nothing to relay (raw protocol frames).
    Skip,
}

/// Conversion between a library's WebSocket message type and proxy frames.
pub trait WsMessage: Sized + Send + Unpin + 'static {
    /// Classify an inbound message.
    fn into_inbound(self) -> Inbound;

    /// Encode an outbound frame.
    fn from_frame(frame: Frame) -> Result<Self, TransportError>;
}

/// A WebSocket connection usable as a proxy [`Transport`].
pub struct WsTransport<S> {
    socket: S,
}

impl<S> WsTransport<S> {
    /// Wrap an established WebSocket.
    pub fn new(socket: S) -> Self {
        Self { socket }
    }

    /// The wrapped socket.
    pub fn into_inner(self) -> S {
        self.socket
    }
}

/// Receiving half of a [`WsTransport`].
pub struct WsSource<S> {
    inner: SplitStream<S>,
}

/// Sending half of a [`WsTransport`].
pub struct WsSink<S, M> {
    inner: SplitSink<S, M>,
}

impl<S, M, E> Transport for WsTransport<S>
where
    S: Stream<Item = Result<M, E>> + Sink<M, Error = E> + Unpin + Send + 'static,
    M: WsMessage,
    E: Display + Send + 'static,
{
    type Source = WsSource<S>;
    type Sink = WsSink<S, M>;

    fn split(self) -> (Self::Source, Self::Sink) {
        let (sink, stream) = self.socket.split();
        (WsSource { inner: stream }, WsSink { inner: sink })
    }
}

#[async_trait]
impl<S, M, E> FrameSource for WsSource<S>
where
    S: Stream<Item = Result<M, E>> + Unpin + Send + 'static,
    M: WsMessage,
    E: Display + Send + 'static,
{
    async fn recv_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            let Some(msg) = self.inner.next().await else {
                return Ok(None);
            };
            match msg.map_err(ws_error)?.into_inbound() {
                Inbound::Frame(frame) => return Ok(Some(frame)),
                Inbound::Close => return Ok(None),
                Inbound::Skip => trace!("skipping raw protocol frame"),
            }
        }
    }
}

#[async_trait]
impl<S, M, E> FrameSink for WsSink<S, M>
where
    S: Sink<M, Error = E> + Unpin + Send + 'static,
    M: WsMessage,
    E: Display + Send + 'static,
{
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let msg = M::from_frame(frame)?;
        self.inner.send(msg).await.map_err(ws_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::close(&mut self.inner).await.map_err(ws_error)
    }
}

fn ws_error(err: impl Display) -> TransportError {
    TransportError::WebSocket(err.to_string())
}

// ── Message mapping ─────────────────────────────────────────────────────────

/// Close frame payload: big-endian status code followed by the UTF-8 reason.
pub fn close_payload(code: u16, reason: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + reason.len());
    buf.put_u16(code);
    buf.put_slice(reason.as_bytes());
    buf.freeze()
}

/// Inverse of [`close_payload`]. `None` for an empty payload.
pub fn parse_close_payload(payload: &[u8]) -> Option<(u16, String)> {
    let (code, reason) = payload.split_first_chunk::<2>()?;
    Some((
        u16::from_be_bytes(*code),
        String::from_utf8_lossy(reason).into_owned(),
    ))
}

fn text_payload(frame: Frame) -> Result<String, TransportError> {
    String::from_utf8(frame.payload.to_vec())
        .map_err(|_| TransportError::WebSocket("text frame is not valid UTF-8".into()))
}

fn unsupported(kind: FrameKind) -> TransportError {
    TransportError::WebSocket(format!("cannot encode frame kind {}", kind.code()))
}

impl WsMessage for ws::Message {
    fn into_inbound(self) -> Inbound {
        match self {
            Self::Text(text) => Inbound::Frame(Frame::text(Bytes::copy_from_slice(
                text.as_str().as_bytes(),
            ))),
            Self::Binary(data) => Inbound::Frame(Frame::binary(data)),
            Self::Ping(data) => Inbound::Frame(Frame::new(FrameKind::PING, data)),
            Self::Pong(data) => Inbound::Frame(Frame::new(FrameKind::PONG, data)),
            Self::Close(_) => Inbound::Close,
        }
    }

    fn from_frame(frame: Frame) -> Result<Self, TransportError> {
        Ok(match frame.kind {
            FrameKind::TEXT => Self::Text(text_payload(frame)?.into()),
            FrameKind::BINARY => Self::Binary(frame.payload),
            FrameKind::PING => Self::Ping(frame.payload),
            FrameKind::PONG => Self::Pong(frame.payload),
            FrameKind::CLOSE => Self::Close(parse_close_payload(&frame.payload).map(
                |(code, reason)| ws::CloseFrame {
                    code,
                    reason: reason.into(),
                },
            )),
            other => return Err(unsupported(other)),
        })
    }
}

impl WsMessage for tungstenite::Message {
    fn into_inbound(self) -> Inbound {
        match self {
            Self::Text(text) => Inbound::Frame(Frame::text(Bytes::copy_from_slice(
                text.as_str().as_bytes(),
            ))),
            Self::Binary(data) => Inbound::Frame(Frame::binary(data)),
            Self::Ping(data) => Inbound::Frame(Frame::new(FrameKind::PING, data)),
            Self::Pong(data) => Inbound::Frame(Frame::new(FrameKind::PONG, data)),
            Self::Close(_) => Inbound::Close,
            Self::Frame(_) => Inbound::Skip,
        }
    }

    fn from_frame(frame: Frame) -> Result<Self, TransportError> {
        Ok(match frame.kind {
            FrameKind::TEXT => Self::Text(text_payload(frame)?.into()),
            FrameKind::BINARY => Self::Binary(frame.payload),
            FrameKind::PING => Self::Ping(frame.payload),
            FrameKind::PONG => Self::Pong(frame.payload),
            FrameKind::CLOSE => Self::Close(parse_close_payload(&frame.payload).map(
                |(code, reason)| CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.into(),
                },
            )),
            other => return Err(unsupported(other)),
        })
    }
}

// ── Handshake ───────────────────────────────────────────────────────────────

/// Server-side WebSocket handshake on a raw byte stream (e.g. an accepted
/// `TcpStream`), for use with [`Proxy::connect`](termbridge_proxy::Proxy::connect).
pub struct AcceptUpgrade<S> {
    stream: S,
}

impl<S> AcceptUpgrade<S> {
    /// Prepare a handshake on `stream`.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S> Upgrade for AcceptUpgrade<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Transport = TungsteniteTransport<S>;

    async fn upgrade(self) -> Result<Self::Transport, TransportError> {
        let socket = tokio_tungstenite::accept_async(self.stream)
            .await
            .map_err(ws_error)?;
        Ok(WsTransport::new(socket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // ── close payload ───────────────────────────────────────────────

    #[test]
    fn close_payload_layout() {
        let payload = close_payload(1000, "bye");
        assert_eq!(&payload[..], &[0x03, 0xE8, b'b', b'y', b'e']);
        assert_eq!(parse_close_payload(&payload), Some((1000, "bye".into())));
    }

    #[test]
    fn short_close_payload_has_no_code() {
        assert_eq!(parse_close_payload(&[]), None);
        assert_eq!(parse_close_payload(&[0x03]), None);
    }

    // ── axum messages ───────────────────────────────────────────────

    #[test]
    fn axum_text_becomes_text_frame() {
        let inbound = ws::Message::Text("hello".to_owned().into()).into_inbound();
        assert_eq!(inbound, Inbound::Frame(Frame::text("hello")));
    }

    #[test]
    fn axum_ping_keeps_payload() {
        let inbound = ws::Message::Ping(Bytes::from_static(b"p")).into_inbound();
        assert_eq!(inbound, Inbound::Frame(Frame::new(FrameKind::PING, "p")));
    }

    #[test]
    fn axum_close_ends_stream() {
        assert_eq!(ws::Message::Close(None).into_inbound(), Inbound::Close);
    }

    #[test]
    fn axum_binary_frame_encodes() {
        let msg = ws::Message::from_frame(Frame::binary(vec![1, 2])).unwrap();
        assert_matches!(msg, ws::Message::Binary(data) if &data[..] == [1, 2]);
    }

    #[test]
    fn axum_close_frame_encodes_code_and_reason() {
        let msg = ws::Message::from_frame(Frame::new(
            FrameKind::CLOSE,
            close_payload(1001, "going away"),
        ))
        .unwrap();
        assert_matches!(msg, ws::Message::Close(Some(cf)) => {
            assert_eq!(cf.code, 1001);
            assert_eq!(cf.reason.as_str(), "going away");
        });
    }

    #[test]
    fn invalid_utf8_text_is_rejected() {
        let err = ws::Message::from_frame(Frame::text(vec![0xFF, 0xFE])).unwrap_err();
        assert_matches!(err, TransportError::WebSocket(_));
    }

    #[test]
    fn unknown_kind_cannot_be_encoded() {
        let err = ws::Message::from_frame(Frame::new(FrameKind(3), "x")).unwrap_err();
        assert!(err.to_string().contains("kind 3"));
    }

    // ── tungstenite messages ────────────────────────────────────────

    #[test]
    fn tungstenite_text_round_trip() {
        let msg = tungstenite::Message::from_frame(Frame::text("héllo")).unwrap();
        assert_eq!(msg.into_inbound(), Inbound::Frame(Frame::text("héllo")));
    }

    #[test]
    fn tungstenite_empty_close_frame() {
        let msg =
            tungstenite::Message::from_frame(Frame::new(FrameKind::CLOSE, Bytes::new())).unwrap();
        assert_matches!(msg, tungstenite::Message::Close(None));
    }

    #[test]
    fn tungstenite_pong_keeps_kind() {
        let inbound = tungstenite::Message::Pong(Bytes::from_static(b"q")).into_inbound();
        assert_eq!(inbound, Inbound::Frame(Frame::new(FrameKind::PONG, "q")));
    }
}
