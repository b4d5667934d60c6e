// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-format event types for room mode.
//!
//! Room payloads are JSON objects with a `type` discriminator, consumed and
//! produced by the external page-rendering collaborator. The two-party task
//! bypasses this vocabulary entirely and relays raw text.

use serde::{Deserialize, Serialize};

/// Events sent by a browser client in room mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Claim an identity in the room.
    Join {
        username: String,
        #[serde(default)]
        os: String,
    },
    /// Say something to everyone else.
    Message { message: String },
    /// The `/list` command: ask for a fresh user-list snapshot.
    ListUsers,
}

/// Events sent by the server in room mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Join confirmation, sent to the joiner only.
    Joined { username: String },
    /// Presence notification to everyone except the joiner.
    UserJoined { username: String },
    /// Presence notification to everyone still connected.
    UserLeft { username: String },
    /// A relayed chat message.
    Message { sender: String, message: String, timestamp: u64 },
    /// User-list snapshot, in join order.
    Users { users: Vec<UserInfo> },
    /// Recoverable rejection (duplicate name, message before join, ...).
    Error { message: String },
}

/// One entry in the room's user list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    pub os: String,
}

/// Current epoch millis, for message timestamps.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
