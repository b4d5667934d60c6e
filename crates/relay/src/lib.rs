// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! chatrelay: a minimal real-time messaging relay over raw TCP.
//!
//! The core is a hand-rolled WebSocket layer — HTTP upgrade handshake and
//! RFC 6455 framing directly on the stream socket — plus a broadcast relay
//! with lightweight presence tracking. Two deployment modes share the same
//! machinery: a two-party chat that forwards raw text, and a multi-user
//! room speaking a JSON event vocabulary. Page serving belongs to an
//! external HTTP collaborator and is not part of this crate.

pub mod config;
pub mod error;
pub mod events;
pub mod listener;
pub mod protocol;
pub mod registry;
pub mod relay;



use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::listener::{ChatListener, Limits};
use crate::relay::Policy;

/// Run both chat listeners until ctrl-c, then stop accepting.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let limits = Limits {
        max_frame_bytes: config.max_frame_bytes,
        max_handshake_bytes: config.max_handshake_bytes,
    };

    let pair = ChatListener::bind(
        &format!("{}:{}", config.host, config.pair_port),
        Policy::Pairwise,
        limits,
        shutdown.clone(),
    )
    .await?;
    let room = ChatListener::bind(
        &format!("{}:{}", config.host, config.room_port),
        Policy::Room,
        limits,
        shutdown.clone(),
    )
    .await?;

    tracing::info!(addr = %pair.local_addr()?, "two-party chat listening");
    tracing::info!(addr = %room.local_addr()?, "chat room listening");

    let pair_task = tokio::spawn(pair.serve());
    let room_task = tokio::spawn(room.serve());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, closing listeners");
    shutdown.cancel();

    let _ = pair_task.await;
    let _ = room_task.await;
    Ok(())
}
