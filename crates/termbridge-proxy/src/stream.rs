//! `AsyncRead`/`AsyncWrite` view of a proxy for byte-oriented backends.
//!
//! Reads pull frames with [`Proxy::recv`], push text/binary payloads through
//! the reassembler and hand out caller-sized slices. Ping/pong frames refresh
//! liveness and are otherwise skipped. A close frame or end-of-stream is EOF.
//! Writes become binary frames on the outbound queue.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::sync::PollSender;
use tracing::trace;

use crate::error::{ProxyError, Result};
use crate::frame::{Frame, FrameKind};
use crate::proxy::Proxy;

type RecvFuture = Pin<Box<dyn Future<Output = Result<Frame>> + Send>>;

/// Byte-stream adapter over a [`Proxy`]. Requires `byte_stream` in the config.
pub struct ProxyStream {
    proxy: Proxy,
    recv: Option<RecvFuture>,
    sender: PollSender<Frame>,
    eof: bool,
}

impl ProxyStream {
    /// Wrap a proxy.
    pub fn new(proxy: Proxy) -> Self {
        let sender = PollSender::new(proxy.outbound());
        Self {
            proxy,
            recv: None,
            sender,
            eof: false,
        }
    }

    /// The underlying proxy.
    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }
}

impl AsyncRead for ProxyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.eof || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            let n = this.proxy.load_buffers(buf.initialize_unfilled())?;
            if n > 0 {
                buf.advance(n);
                return Poll::Ready(Ok(()));
            }

            let proxy = &this.proxy;
            let recv = this.recv.get_or_insert_with(|| {
                let proxy = proxy.clone();
                Box::pin(async move { proxy.recv().await })
            });
            let received = ready!(recv.as_mut().poll(cx));
            this.recv = None;

            match received {
                Ok(frame) if frame.kind.is_data() => {
                    let n = this
                        .proxy
                        .handle_input(buf.initialize_unfilled(), &frame.payload)?;
                    if n > 0 {
                        buf.advance(n);
                        return Poll::Ready(Ok(()));
                    }
                }
                Ok(frame) if frame.kind.is_heartbeat() => this.proxy.refresh_liveness(),
                Ok(frame) if frame.kind == FrameKind::CLOSE => {
                    this.eof = true;
                    return Poll::Ready(Ok(()));
                }
                Ok(frame) => trace!(kind = ?frame.kind, "skipping non-data frame"),
                Err(e) if e.is_closed() => {
                    this.eof = true;
                    return Poll::Ready(Ok(()));
                }
                Err(e) => return Poll::Ready(Err(e.into())),
            }
        }
    }
}

impl AsyncWrite for ProxyStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.proxy.is_cancelled() {
            return Poll::Ready(Err(ProxyError::Cancelled.into()));
        }
        if this.proxy.is_closed() {
            return Poll::Ready(Err(ProxyError::Closed.into()));
        }
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }

        ready!(this.sender.poll_reserve(cx)).map_err(|_| io::Error::from(ProxyError::Closed))?;
        this.sender
            .send_item(Frame::binary(Bytes::copy_from_slice(data)))
            .map_err(|_| io::Error::from(ProxyError::Closed))?;
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    /// Closes the whole proxy, not just the write direction.
    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.sender.close();
        let _ = this.proxy.close();
        Poll::Ready(Ok(()))
    }
}
