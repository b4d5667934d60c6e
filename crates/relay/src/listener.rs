// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection listener: TCP accept loop plus per-connection tasks.
//!
//! Each accepted connection gets one reader task (handshake, then the frame
//! read loop) and one writer task draining an outbound queue, so all writes
//! to a socket are serialized through a single owner. Every exit from the
//! read loop funnels into exactly one registry removal.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::protocol::frame::{self, encode_frame, Frame, OpCode};
use crate::protocol::handshake;
use crate::registry::Registry;
use crate::relay::{Policy, Relay};

/// Limits applied to every connection of a listener.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_frame_bytes: usize,
    pub max_handshake_bytes: usize,
}

/// One WebSocket chat listener with its own registry and relay.
pub struct ChatListener {
    listener: TcpListener,
    registry: Arc<Registry>,
    relay: Arc<Relay>,
    limits: Limits,
    shutdown: CancellationToken,
}

impl ChatListener {
    pub async fn bind(
        addr: &str,
        policy: Policy,
        limits: Limits,
        shutdown: CancellationToken,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let registry = Arc::new(Registry::new());
        let relay = Arc::new(Relay::new(Arc::clone(&registry), policy));
        Ok(Self { listener, registry, relay, limits, shutdown })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. A failure handling one connection never terminates the
    /// loop. Cancelling `shutdown` only stops accepting: connection tokens
    /// are not children of it, so open connections run to their own end.
    pub async fn serve(self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let registry = Arc::clone(&self.registry);
                            let relay = Arc::clone(&self.relay);
                            let limits = self.limits;
                            tokio::spawn(async move {
                                handle_connection(stream, addr, registry, relay, limits).await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!(err = %e, "accept failed");
                        }
                    }
                }
            }
        }
        tracing::debug!("listener stopped accepting");
    }
}

/// Drive one connection end to end: handshake, register, read frames until
/// a terminal condition, then clean up exactly once.
async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<Registry>,
    relay: Arc<Relay>,
    limits: Limits,
) {
    let request = match read_upgrade_request(&mut stream, limits.max_handshake_bytes).await {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(%addr, err = %e, "upgrade request read failed");
            return;
        }
    };
    let response = match handshake::negotiate(&request) {
        Ok(response) => response,
        Err(e) => {
            // Rejected before registration: close without a response and
            // without a leave notification.
            tracing::debug!(%addr, err = %e, "handshake rejected");
            return;
        }
    };

    let id = registry.next_id();
    let cancel = CancellationToken::new();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (read_half, write_half) = stream.into_split();

    // Register before the 101 goes out, then route the response through the
    // outbound queue: the writer task owns the socket's write half from the
    // first byte, and a peer that sees the 101 is already a member.
    registry.insert(id, out_tx.clone(), cancel.clone());
    let writer = tokio::spawn(write_loop(write_half, out_rx, cancel.clone()));
    let _ = out_tx.send(Bytes::from(response.into_bytes()));
    tracing::info!(conn = id, %addr, "connection open");

    read_loop(read_half, id, &out_tx, &relay, limits.max_frame_bytes, &cancel).await;

    relay.on_disconnect(id);
    drop(out_tx);
    let _ = writer.await;
    tracing::info!(conn = id, %addr, "connection closed");
}

/// Frame read loop for one OPEN connection. Returns on: a received close
/// frame, a decode failure, peer disconnect, or cancellation (the writer
/// cancels on write failure, the relay cancels unreachable recipients).
async fn read_loop(
    mut read_half: OwnedReadHalf,
    id: u64,
    out_tx: &mpsc::UnboundedSender<Bytes>,
    relay: &Relay,
    max_frame_bytes: usize,
    cancel: &CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frame::read_frame(&mut read_half, max_frame_bytes) => frame,
        };
        match frame {
            Ok(Some(Frame { opcode: OpCode::Text, payload })) => {
                match String::from_utf8(payload) {
                    Ok(text) => relay.on_text(id, &text),
                    Err(_) => {
                        tracing::debug!(conn = id, "non-utf8 text frame");
                        break;
                    }
                }
            }
            Ok(Some(Frame { opcode: OpCode::Ping, payload })) => {
                let _ = out_tx.send(encode_frame(OpCode::Pong, &payload));
            }
            Ok(Some(Frame { opcode: OpCode::Close, .. })) => {
                // Echo the close, then let the queue drain on teardown.
                let _ = out_tx.send(encode_frame(OpCode::Close, &[]));
                break;
            }
            Ok(Some(_)) => {
                // Pong and binary frames are ignored; continuation never
                // reaches here (the codec rejects fragmentation).
            }
            Ok(None) => {
                tracing::debug!(conn = id, "peer disconnected");
                break;
            }
            Err(e) => {
                tracing::debug!(conn = id, err = %e, "read loop terminated");
                break;
            }
        }
    }
}

/// Writer task: sole owner of the socket's write half. Drains the outbound
/// queue until every sender is gone, so frames queued during teardown (close
/// echo, final broadcasts) still go out.
async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut out_rx: mpsc::UnboundedReceiver<Bytes>,
    cancel: CancellationToken,
) {
    while let Some(buf) = out_rx.recv().await {
        if let Err(e) = write_half.write_all(&buf).await {
            tracing::debug!(err = %e, "write failed");
            // Wake the reader so cleanup runs exactly once, from its task.
            cancel.cancel();
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

/// Accumulate the HTTP upgrade request up to its `\r\n\r\n` terminator,
/// bounded by `max_bytes`.
async fn read_upgrade_request(
    stream: &mut TcpStream,
    max_bytes: usize,
) -> Result<String, RelayError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(RelayError::handshake("connection closed before request completed"));
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if buf.len() > max_bytes {
            return Err(RelayError::handshake(format!(
                "upgrade request exceeds {max_bytes} bytes"
            )));
        }
    }
    String::from_utf8(buf).map_err(|_| RelayError::handshake("upgrade request is not valid utf-8"))
}
