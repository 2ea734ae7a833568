//! Session handlers: what runs on the backend side of a proxy.

use std::process::Stdio;

use async_trait::async_trait;
use termbridge_proxy::{FrameKind, Proxy, ProxyError, ProxyStream};
use tokio::io;
use tokio::process::Command;
use tracing::{debug, info, trace};

use crate::errors::SessionError;

/// Backend logic for one connected client.
///
/// `run` owns the session until it returns; the caller closes the proxy
/// afterwards regardless of the outcome.
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Drive the session over `proxy`.
    async fn run(&self, proxy: Proxy) -> Result<(), SessionError>;
}

/// Whether an error just means the session is over.
fn is_hangup(err: &ProxyError) -> bool {
    err.is_closed() || matches!(err, ProxyError::Cancelled)
}

/// Echoes every text and binary frame back to the client.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoSession;

#[async_trait]
impl SessionHandler for EchoSession {
    async fn run(&self, proxy: Proxy) -> Result<(), SessionError> {
        loop {
            let frame = match proxy.recv().await {
                Ok(frame) => frame,
                Err(e) if is_hangup(&e) => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            match frame.kind {
                kind if kind.is_heartbeat() => proxy.refresh_liveness(),
                kind if kind.is_data() => match proxy.send(kind, frame.payload).await {
                    Ok(()) => {}
                    Err(e) if is_hangup(&e) => return Ok(()),
                    Err(e) => return Err(e.into()),
                },
                FrameKind::CLOSE => return Ok(()),
                kind => trace!(?kind, "ignoring frame"),
            }
        }
    }
}

/// Runs a local command per session and bridges its stdio to the client.
///
/// Client text and binary payloads are written to the child's stdin; stdout
/// and stderr are sent back as binary frames. The session ends when the
/// child closes its output or the client goes away.
#[derive(Debug, Clone)]
pub struct CommandSession {
    program: String,
    args: Vec<String>,
}

impl CommandSession {
    /// Build from an argv list. `None` if `argv` is empty.
    pub fn new(argv: Vec<String>) -> Option<Self> {
        let mut argv = argv.into_iter();
        let program = argv.next()?;
        Some(Self {
            program,
            args: argv.collect(),
        })
    }

    /// Program to run.
    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl SessionHandler for CommandSession {
    async fn run(&self, proxy: Proxy) -> Result<(), SessionError> {
        if !proxy.config().byte_stream {
            return Err(ProxyError::ByteStreamDisabled.into());
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SessionError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        info!(program = %self.program, pid = ?child.id(), "command started");

        let (Some(mut stdin), Some(mut stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(io::Error::other("child stdio was not captured").into());
        };

        let mut client_in = ProxyStream::new(proxy.clone());
        let mut client_out = ProxyStream::new(proxy.clone());
        let mut client_err = ProxyStream::new(proxy.clone());

        // Owns stdin, so the child sees EOF once client input ends.
        let to_child = async move { io::copy(&mut client_in, &mut stdin).await };
        let from_child = async {
            tokio::try_join!(
                io::copy(&mut stdout, &mut client_out),
                io::copy(&mut stderr, &mut client_err),
            )
        };
        let discard = discard_input(&proxy);
        tokio::pin!(to_child, from_child, discard);

        let mut input_open = true;
        let mut discarding = false;
        let bridged = loop {
            tokio::select! {
                res = &mut from_child => break res.map(|(out, err)| {
                    debug!(stdout_bytes = out, stderr_bytes = err, "command output finished");
                }),
                res = &mut to_child, if input_open => {
                    input_open = false;
                    discarding = !proxy.is_closed();
                    match res {
                        Ok(n) => debug!(bytes = n, "client input finished"),
                        Err(e) => debug!(error = %e, "client input stopped"),
                    }
                }
                () = &mut discard, if discarding => discarding = false,
                () = proxy.closed() => break Ok(()),
            }
        };

        if proxy.is_closed() {
            // Client went away; nobody is left to read the output.
            child.kill().await?;
            info!(program = %self.program, "command killed after client disconnect");
        } else {
            tokio::select! {
                status = child.wait() => {
                    let status = status?;
                    info!(program = %self.program, code = ?status.code(), "command exited");
                }
                () = proxy.closed() => child.kill().await?,
            }
        }
        let _ = proxy.close();

        match bridged {
            Ok(()) => Ok(()),
            Err(_) if proxy.is_closed() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reads client frames after the command's stdin is gone, so heartbeats
/// keep counting while output is still flowing.
async fn discard_input(proxy: &Proxy) {
    loop {
        match proxy.recv().await {
            Ok(frame) if frame.kind.is_heartbeat() => proxy.refresh_liveness(),
            Ok(frame) if frame.kind == FrameKind::CLOSE => return,
            Ok(frame) => trace!(kind = ?frame.kind, len = frame.len(), "stdin closed, dropping frame"),
            Err(_) => return,
        }
    }
}
