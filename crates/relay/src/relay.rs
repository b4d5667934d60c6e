// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast relay: decides which connections receive an inbound message
//! and serializes outbound frames.

use std::sync::Arc;

use bytes::Bytes;

use crate::events::{epoch_ms, ClientEvent, ServerEvent, UserInfo};
use crate::protocol::frame::{encode_frame, OpCode};
use crate::registry::Registry;

/// Fan-out policy, selected per listener.
#[derive(Debug, Clone, Copy)]
pub enum Policy {
    /// Two-party chat: forward raw text to every peer except the sender.
    /// With more than one other peer this degrades to plain fan-out; the
    /// mode assumes a bounded small set.
    Pairwise,
    /// Multi-user chat room with join/leave/list semantics.
    Room,
}

pub struct Relay {
    registry: Arc<Registry>,
    policy: Policy,
}

impl Relay {
    pub fn new(registry: Arc<Registry>, policy: Policy) -> Self {
        Self { registry, policy }
    }

    /// Handle one decoded text payload from `sender_id`.
    pub fn on_text(&self, sender_id: u64, payload: &str) {
        match self.policy {
            Policy::Pairwise => self.relay_raw(sender_id, payload),
            Policy::Room => self.dispatch_event(sender_id, payload),
        }
    }

    /// Handle teardown of a connection.
    ///
    /// Idempotent: the registry remove succeeds at most once, so the leave
    /// notification can never double-fire even when a read error and a write
    /// error race on the same connection.
    pub fn on_disconnect(&self, id: u64) {
        let Some(removed) = self.registry.remove(id) else {
            return;
        };
        if let Some(user) = removed.identity {
            tracing::info!(conn = id, username = %user.username, "user left");
            self.broadcast_except(id, &ServerEvent::UserLeft { username: user.username });
        }
    }

    fn relay_raw(&self, sender_id: u64, text: &str) {
        let frame = encode_frame(OpCode::Text, text.as_bytes());
        for peer in self.registry.recipients_except(sender_id) {
            if !peer.deliver(frame.clone()) {
                tracing::debug!(peer = peer.id, "dropping unreachable peer");
            }
        }
    }

    fn dispatch_event(&self, sender_id: u64, payload: &str) {
        let event = match serde_json::from_str::<ClientEvent>(payload) {
            Ok(event) => event,
            Err(e) => {
                // Recoverable: tell the sender and keep the connection open.
                tracing::debug!(conn = sender_id, err = %e, "unparsable room event");
                self.send_to(
                    sender_id,
                    &ServerEvent::Error { message: format!("unrecognized message: {e}") },
                );
                return;
            }
        };
        match event {
            ClientEvent::Join { username, os } => self.handle_join(sender_id, username, os),
            ClientEvent::Message { message } => self.handle_message(sender_id, message),
            ClientEvent::ListUsers => {
                self.send_to(sender_id, &ServerEvent::Users { users: self.registry.list() });
            }
        }
    }

    /// Duplicate-name policy: reject the new join, leave the existing
    /// session intact.
    fn handle_join(&self, sender_id: u64, username: String, os: String) {
        if username.trim().is_empty() {
            self.send_to(
                sender_id,
                &ServerEvent::Error { message: "username must not be empty".to_owned() },
            );
            return;
        }
        let user = UserInfo { username: username.clone(), os };
        if let Err(e) = self.registry.claim_identity(sender_id, user) {
            tracing::debug!(conn = sender_id, err = %e, "join rejected");
            self.send_to(sender_id, &ServerEvent::Error { message: e.to_string() });
            return;
        }
        tracing::info!(conn = sender_id, username = %username, "user joined");
        self.send_to(sender_id, &ServerEvent::Joined { username: username.clone() });
        self.broadcast_except(sender_id, &ServerEvent::UserJoined { username });
        self.send_to(sender_id, &ServerEvent::Users { users: self.registry.list() });
    }

    fn handle_message(&self, sender_id: u64, message: String) {
        let Some(user) = self.registry.identity(sender_id) else {
            tracing::debug!(conn = sender_id, "message from unidentified sender");
            self.send_to(
                sender_id,
                &ServerEvent::Error { message: "join before sending messages".to_owned() },
            );
            return;
        };
        self.broadcast_except(
            sender_id,
            &ServerEvent::Message { sender: user.username, message, timestamp: epoch_ms() },
        );
    }

    /// Reply to a single connection. A missing or unreachable recipient is
    /// not an error — it is already being torn down.
    fn send_to(&self, id: u64, event: &ServerEvent) {
        let Some(frame) = encode_event(event) else {
            return;
        };
        if let Some(peer) = self.registry.get(id) {
            peer.deliver(frame);
        }
    }

    /// Best-effort fan-out to everyone except `sender_id`. A failed send
    /// never aborts delivery to the remaining recipients.
    fn broadcast_except(&self, sender_id: u64, event: &ServerEvent) {
        let Some(frame) = encode_event(event) else {
            return;
        };
        for peer in self.registry.recipients_except(sender_id) {
            if !peer.deliver(frame.clone()) {
                tracing::debug!(peer = peer.id, "dropping unreachable peer");
            }
        }
    }
}

/// Serialize a server event into a single unmasked text frame.
fn encode_event(event: &ServerEvent) -> Option<Bytes> {
    match serde_json::to_string(event) {
        Ok(json) => Some(encode_frame(OpCode::Text, json.as_bytes())),
        Err(e) => {
            tracing::warn!(err = %e, "event serialization failed");
            None
        }
    }
}
