// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket frame codec (RFC 6455 §5.2).
//!
//! Layout: FIN+opcode byte, mask-bit+length byte, optional extended length
//! (2 or 8 bytes, big-endian), optional 4-byte mask, payload. Fragmentation
//! is not supported: every frame read or written here carries FIN.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::RelayError;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const OPCODE_MASK: u8 = 0x0F;
const LEN_MASK: u8 = 0x7F;

/// How to interpret a frame's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    fn from_bits(bits: u8) -> Result<Self, RelayError> {
        match bits {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(RelayError::protocol(format!("unknown opcode 0x{other:x}"))),
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }
}

/// One decoded WebSocket message unit. Ephemeral: constructed, dispatched,
/// discarded. The mask key never appears in the decoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

/// Read exactly one frame from `reader`.
///
/// Returns `None` on a clean disconnect (zero-byte read at a frame
/// boundary). A stream that closes mid-frame, a declared length above
/// `max_payload`, or a fragmented frame is a `Protocol` error.
pub async fn read_frame<R>(
    reader: &mut R,
    max_payload: usize,
) -> Result<Option<Frame>, RelayError>
where
    R: AsyncRead + Unpin,
{
    // The first header byte doubles as the EOF probe: a clean disconnect
    // shows up as a zero-byte read here rather than mid-frame.
    let mut b0 = [0u8; 1];
    match reader.read(&mut b0).await {
        Ok(0) => return Ok(None),
        Ok(_) => {}
        Err(e) => return Err(RelayError::Io(e)),
    }

    let mut b1 = [0u8; 1];
    fill(reader, &mut b1).await?;

    let opcode = OpCode::from_bits(b0[0] & OPCODE_MASK)?;
    if b0[0] & FIN_BIT == 0 || opcode == OpCode::Continuation {
        return Err(RelayError::protocol("fragmented frames are not supported"));
    }

    let masked = b1[0] & MASK_BIT != 0;
    let len = match b1[0] & LEN_MASK {
        126 => {
            let mut ext = [0u8; 2];
            fill(reader, &mut ext).await?;
            u64::from(u16::from_be_bytes(ext))
        }
        127 => {
            let mut ext = [0u8; 8];
            fill(reader, &mut ext).await?;
            u64::from_be_bytes(ext)
        }
        n => u64::from(n),
    };
    if len > max_payload as u64 {
        return Err(RelayError::protocol(format!(
            "declared payload of {len} bytes exceeds limit of {max_payload}"
        )));
    }

    let mask = if masked {
        let mut m = [0u8; 4];
        fill(reader, &mut m).await?;
        Some(m)
    } else {
        None
    };

    let mut payload = vec![0u8; len as usize];
    fill(reader, &mut payload).await?;
    if let Some(mask) = mask {
        apply_mask(&mut payload, mask);
    }

    Ok(Some(Frame { opcode, payload }))
}

/// Encode a complete unmasked frame (server role).
///
/// Server-to-client frames are deliberately unmasked; acceptable for
/// same-origin lab use, where no untrusted proxy sits on the path.
pub fn encode_frame(opcode: OpCode, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 10);
    put_header(&mut buf, opcode, payload.len(), false);
    buf.put_slice(payload);
    buf.freeze()
}

/// Encode a complete masked frame (client role). Used by tests and
/// in-repo probe clients exercising the server decoder.
pub fn encode_masked_frame(opcode: OpCode, payload: &[u8], mask: [u8; 4]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 14);
    put_header(&mut buf, opcode, payload.len(), true);
    buf.put_slice(&mask);
    let start = buf.len();
    buf.put_slice(payload);
    apply_mask(&mut buf[start..], mask);
    buf.freeze()
}

/// XOR each payload byte with `mask[i % 4]`. Position-modulo-4, independent
/// of how the length was encoded. Involutive: applying twice restores.
pub fn apply_mask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Minimal length encoding: 7-bit direct value up to 125, 2-byte extension
/// at 126, 8-byte extension at 127. All extensions big-endian.
fn put_header(buf: &mut BytesMut, opcode: OpCode, len: usize, masked: bool) {
    let mask_bit = if masked { MASK_BIT } else { 0 };
    buf.put_u8(FIN_BIT | opcode.bits());
    if len <= 125 {
        buf.put_u8(mask_bit | len as u8);
    } else if len <= usize::from(u16::MAX) {
        buf.put_u8(mask_bit | 126);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(mask_bit | 127);
        buf.put_u64(len as u64);
    }
}

async fn fill<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), RelayError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(RelayError::protocol("stream closed mid-frame"))
        }
        Err(e) => Err(RelayError::Io(e)),
    }
}
