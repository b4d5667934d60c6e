// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::io;

/// Error taxonomy for the relay core.
///
/// `Protocol` and `Io` are terminal for the connection they occur on;
/// `Handshake` aborts a connection before it is ever registered; `State` is
/// recoverable and reported back to the offending sender as an `error` event.
#[derive(Debug)]
pub enum RelayError {
    /// Malformed or oversized WebSocket frame.
    Protocol(String),
    /// Missing or invalid HTTP upgrade headers.
    Handshake(String),
    /// Application-level violation: unidentified sender, duplicate join.
    State(String),
    /// Socket read/write failure or peer reset.
    Io(io::Error),
}

impl RelayError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::Handshake(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Handshake(msg) => write!(f, "handshake failed: {msg}"),
            // State messages are relayed to clients verbatim.
            Self::State(msg) => f.write_str(msg),
            Self::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RelayError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
