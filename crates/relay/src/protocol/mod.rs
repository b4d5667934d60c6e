// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hand-rolled WebSocket protocol layer: HTTP upgrade handshake and the
//! RFC 6455 frame codec. No external protocol library — browser clients
//! talk to this directly over raw TCP.

pub mod frame;
pub mod handshake;
