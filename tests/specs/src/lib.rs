// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end relay tests over real sockets.
//!
//! Binds an in-process listener to an ephemeral port and exercises it two
//! ways: with `tokio-tungstenite` as an unmodified off-the-shelf client,
//! and with a raw TCP client that performs the upgrade by hand to pin down
//! the exact bytes on the wire.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use chatrelay::listener::{ChatListener, Limits};
use chatrelay::relay::Policy;

/// An in-process relay listener bound to an ephemeral port.
pub struct RelayServer {
    pub addr: SocketAddr,
    shutdown: CancellationToken,
}

impl RelayServer {
    pub async fn start(policy: Policy) -> anyhow::Result<Self> {
        let shutdown = CancellationToken::new();
        let limits = Limits { max_frame_bytes: 1 << 20, max_handshake_bytes: 8192 };
        let listener = ChatListener::bind("127.0.0.1:0", policy, limits, shutdown.clone()).await?;
        let addr = listener.local_addr()?;
        tokio::spawn(listener.serve());
        Ok(Self { addr, shutdown })
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Perform the client side of the upgrade by hand, returning the socket and
/// the raw 101 response head.
pub async fn raw_handshake(addr: SocketAddr, key: &str) -> anyhow::Result<(TcpStream, String)> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!(
        "GET / HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    );
    stream.write_all(request.as_bytes()).await?;

    // The response head is the only unframed data the server ever sends, so
    // reading byte-wise up to the terminator cannot eat into frame data.
    let mut response = Vec::new();
    let mut byte = [0u8; 1];
    while !response.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            anyhow::bail!("server closed during handshake");
        }
        response.push(byte[0]);
        if response.len() > 8192 {
            anyhow::bail!("oversized handshake response");
        }
    }
    Ok((stream, String::from_utf8(response)?))
}
