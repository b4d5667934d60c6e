// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that bind real listeners and exercise them with
//! both a raw TCP client (exact bytes) and `tokio-tungstenite` (protocol
//! interop with an unmodified client).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use chatrelay::protocol::frame::{encode_masked_frame, OpCode};
use chatrelay::relay::Policy;
use chatrelay_specs::{raw_handshake, RelayServer};

const TIMEOUT: Duration = Duration::from_secs(10);

// RFC 6455 §1.3 sample key and its derived accept value.
const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
const SAMPLE_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(server: &RelayServer) -> anyhow::Result<Ws> {
    let (ws, _) = tokio_tungstenite::connect_async(server.ws_url()).await?;
    Ok(ws)
}

async fn next_json(ws: &mut Ws) -> anyhow::Result<serde_json::Value> {
    loop {
        let msg = tokio::time::timeout(TIMEOUT, ws.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("ws stream ended"))??;
        match msg {
            Message::Text(t) => return Ok(serde_json::from_str(&t)?),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => anyhow::bail!("expected text ws message, got: {other:?}"),
        }
    }
}

async fn join(ws: &mut Ws, username: &str) -> anyhow::Result<()> {
    let payload = serde_json::json!({ "type": "join", "username": username, "os": "Linux" });
    ws.send(Message::Text(payload.to_string().into())).await?;
    Ok(())
}

// -- Handshake ----------------------------------------------------------------

#[tokio::test]
async fn handshake_response_is_bit_exact() -> anyhow::Result<()> {
    let server = RelayServer::start(Policy::Pairwise).await?;
    let (_stream, response) = raw_handshake(server.addr, SAMPLE_KEY).await?;

    assert_eq!(
        response,
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {SAMPLE_ACCEPT}\r\n\
             \r\n"
        )
    );
    Ok(())
}

#[tokio::test]
async fn non_upgrade_request_gets_no_response() -> anyhow::Result<()> {
    let server = RelayServer::start(Policy::Pairwise).await?;
    let mut stream = TcpStream::connect(server.addr).await?;
    stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await?;

    // The server drops the socket without writing anything back.
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(TIMEOUT, stream.read(&mut buf)).await??;
    assert_eq!(n, 0, "expected silent close, got a byte");
    Ok(())
}

// -- Pairwise relay (raw frames) ----------------------------------------------

#[tokio::test]
async fn pairwise_text_is_forwarded_unmasked() -> anyhow::Result<()> {
    let server = RelayServer::start(Policy::Pairwise).await?;
    let (mut a, _) = raw_handshake(server.addr, SAMPLE_KEY).await?;
    let (mut b, _) = raw_handshake(server.addr, SAMPLE_KEY).await?;

    let frame = encode_masked_frame(OpCode::Text, b"hello", [0x12, 0x34, 0x56, 0x78]);
    a.write_all(&frame).await?;

    let mut got = [0u8; 7];
    tokio::time::timeout(TIMEOUT, b.read_exact(&mut got)).await??;
    assert_eq!(got, [0x81, 0x05, b'h', b'e', b'l', b'l', b'o']);
    Ok(())
}

#[tokio::test]
async fn ping_is_answered_with_matching_pong() -> anyhow::Result<()> {
    let server = RelayServer::start(Policy::Pairwise).await?;
    let (mut a, _) = raw_handshake(server.addr, SAMPLE_KEY).await?;

    let frame = encode_masked_frame(OpCode::Ping, b"tick", [9, 8, 7, 6]);
    a.write_all(&frame).await?;

    let mut got = [0u8; 6];
    tokio::time::timeout(TIMEOUT, a.read_exact(&mut got)).await??;
    assert_eq!(got, [0x8A, 0x04, b't', b'i', b'c', b'k']);
    Ok(())
}

#[tokio::test]
async fn close_is_echoed_then_socket_drops() -> anyhow::Result<()> {
    let server = RelayServer::start(Policy::Pairwise).await?;
    let (mut a, _) = raw_handshake(server.addr, SAMPLE_KEY).await?;

    let frame = encode_masked_frame(OpCode::Close, b"", [1, 2, 3, 4]);
    a.write_all(&frame).await?;

    let mut got = [0u8; 2];
    tokio::time::timeout(TIMEOUT, a.read_exact(&mut got)).await??;
    assert_eq!(got, [0x88, 0x00]);

    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(TIMEOUT, a.read(&mut buf)).await??;
    assert_eq!(n, 0, "expected close after echo");
    Ok(())
}

// -- Room relay (tungstenite client) ------------------------------------------

#[tokio::test]
async fn room_join_message_and_leave_flow() -> anyhow::Result<()> {
    let server = RelayServer::start(Policy::Room).await?;

    let mut alice = connect(&server).await?;
    join(&mut alice, "alice").await?;
    let joined = next_json(&mut alice).await?;
    assert_eq!(joined["type"], "joined");
    assert_eq!(joined["username"], "alice");
    let users = next_json(&mut alice).await?;
    assert_eq!(users["type"], "users");
    assert_eq!(users["users"][0]["username"], "alice");

    let mut bob = connect(&server).await?;
    join(&mut bob, "bob").await?;
    let seen = next_json(&mut alice).await?;
    assert_eq!(seen["type"], "user_joined");
    assert_eq!(seen["username"], "bob");
    let joined = next_json(&mut bob).await?;
    assert_eq!(joined["type"], "joined");

    bob.send(Message::Text(r#"{"type":"message","message":"hi alice"}"#.into())).await?;
    let msg = next_json(&mut alice).await?;
    assert_eq!(msg["type"], "message");
    assert_eq!(msg["sender"], "bob");
    assert_eq!(msg["message"], "hi alice");
    assert!(msg["timestamp"].as_u64().is_some_and(|t| t > 0));

    bob.close(None).await?;
    let left = next_json(&mut alice).await?;
    assert_eq!(left["type"], "user_left");
    assert_eq!(left["username"], "bob");

    alice.send(Message::Text(r#"{"type":"list_users"}"#.into())).await?;
    let users = next_json(&mut alice).await?;
    assert_eq!(users["type"], "users");
    assert_eq!(users["users"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn room_duplicate_username_rejected() -> anyhow::Result<()> {
    let server = RelayServer::start(Policy::Room).await?;

    let mut alice = connect(&server).await?;
    join(&mut alice, "alice").await?;
    let joined = next_json(&mut alice).await?;
    assert_eq!(joined["type"], "joined");

    let mut imposter = connect(&server).await?;
    join(&mut imposter, "alice").await?;
    let err = next_json(&mut imposter).await?;
    assert_eq!(err["type"], "error");
    assert!(err["message"].as_str().is_some_and(|m| m.contains("alice")));

    // The rejected connection is still usable after a corrected join.
    join(&mut imposter, "bob").await?;
    let joined = next_json(&mut imposter).await?;
    assert_eq!(joined["type"], "joined");
    assert_eq!(joined["username"], "bob");
    Ok(())
}

#[tokio::test]
async fn room_message_before_join_is_error_event() -> anyhow::Result<()> {
    let server = RelayServer::start(Policy::Room).await?;
    let mut ws = connect(&server).await?;

    ws.send(Message::Text(r#"{"type":"message","message":"early"}"#.into())).await?;
    let err = next_json(&mut ws).await?;
    assert_eq!(err["type"], "error");

    // Still connected: a join afterwards succeeds.
    join(&mut ws, "late").await?;
    let joined = next_json(&mut ws).await?;
    assert_eq!(joined["type"], "joined");
    Ok(())
}
