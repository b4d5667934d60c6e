// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP upgrade negotiation that converts a plain TCP connection into a
//! WebSocket connection.

use base64::Engine;

use crate::error::RelayError;

/// Protocol-mandated GUID appended to the client key before hashing
/// (RFC 6455 §1.3). Must match exactly.
const WS_ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute the `Sec-WebSocket-Accept` value for a client key.
pub fn compute_accept(key: &str) -> String {
    let digest = ring::digest::digest(
        &ring::digest::SHA1_FOR_LEGACY_USE_ONLY,
        format!("{key}{WS_ACCEPT_GUID}").as_bytes(),
    );
    base64::engine::general_purpose::STANDARD.encode(digest.as_ref())
}

/// Validate a raw HTTP upgrade request and produce the 101 response block.
///
/// Requires an `Upgrade: websocket` header (case-insensitive substring
/// match) and a `Sec-WebSocket-Key` header. On failure the caller closes
/// the connection without writing a response.
pub fn negotiate(request: &str) -> Result<String, RelayError> {
    if !request.to_ascii_lowercase().contains("upgrade: websocket") {
        return Err(RelayError::handshake("missing 'Upgrade: websocket' header"));
    }
    let key = header_value(request, "sec-websocket-key")
        .ok_or_else(|| RelayError::handshake("missing Sec-WebSocket-Key header"))?;
    if key.is_empty() {
        return Err(RelayError::handshake("empty Sec-WebSocket-Key header"));
    }
    let accept = compute_accept(key);
    // Byte-exact: standard browser clients verify this block as-is.
    Ok(format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\
         \r\n"
    ))
}

/// Case-insensitive lookup of a header value in a raw HTTP request.
fn header_value<'a>(request: &'a str, name: &str) -> Option<&'a str> {
    for line in request.split("\r\n") {
        if let Some((field, value)) = line.split_once(':') {
            if field.trim().eq_ignore_ascii_case(name) {
                return Some(value.trim());
            }
        }
    }
    None
}
