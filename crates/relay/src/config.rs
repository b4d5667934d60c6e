// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the chat relay server.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "chatrelay", about = "WebSocket chat relay for browser clients")]
pub struct RelayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "CHATRELAY_HOST")]
    pub host: String,

    /// Port for the two-party chat listener.
    #[arg(long, default_value_t = 8082, env = "CHATRELAY_PAIR_PORT")]
    pub pair_port: u16,

    /// Port for the multi-user chat room listener.
    #[arg(long, default_value_t = 8083, env = "CHATRELAY_ROOM_PORT")]
    pub room_port: u16,

    /// Maximum accepted frame payload size in bytes.
    #[arg(long, default_value_t = 1024 * 1024, env = "CHATRELAY_MAX_FRAME_BYTES")]
    pub max_frame_bytes: usize,

    /// Maximum accepted HTTP upgrade request size in bytes.
    #[arg(long, default_value_t = 8192, env = "CHATRELAY_MAX_HANDSHAKE_BYTES")]
    pub max_handshake_bytes: usize,
}
