// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The harbor wire frame: a 4-byte big-endian length prefix, the payload,
//! and a 12-byte trailer of three big-endian `u32`s (source, destination
//! with type folded into its high byte, session).
//!
//! Grounded on `service_harbor.c`'s `to_bigendian`/`from_bigendian` and
//! `header_to_message`/`message_to_header`: the frame never carries the
//! destination's node id on the wire (the receiver already knows who it
//! is), only the type tag and the receiver-local id.

use hub_core::error::HarborError;
use hub_core::{Handle, TypeTag};

/// Frames at or above this length are rejected (`L < 2^24`, i.e. strictly
/// under 16 MiB).
pub const MAX_FRAME_LEN: u32 = 1 << 24;

/// Length of the length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// The 12-byte trailer appended after the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub source: Handle,
    /// Low 24 bits only; the receiver ORs in its own node id before
    /// delivering locally.
    pub destination_local_id: u32,
    pub type_tag: TypeTag,
    pub session: u32,
}

impl Trailer {
    pub const LEN: usize = 12;

    pub fn encode(&self) -> [u8; Trailer::LEN] {
        let dest_word = ((self.type_tag.as_u8() as u32) << 24)
            | (self.destination_local_id & hub_core::handle::HANDLE_MASK);
        let mut out = [0u8; Trailer::LEN];
        out[0..4].copy_from_slice(&self.source.raw().to_be_bytes());
        out[4..8].copy_from_slice(&dest_word.to_be_bytes());
        out[8..12].copy_from_slice(&self.session.to_be_bytes());
        out
    }

    #[allow(clippy::expect_used)]
    pub fn decode(bytes: &[u8]) -> Result<Self, HarborError> {
        if bytes.len() != Trailer::LEN {
            return Err(HarborError::UnexpectedState(0));
        }
        let source = u32::from_be_bytes(bytes[0..4].try_into().expect("slice is 4 bytes"));
        let dest_word = u32::from_be_bytes(bytes[4..8].try_into().expect("slice is 4 bytes"));
        let session = u32::from_be_bytes(bytes[8..12].try_into().expect("slice is 4 bytes"));
        let type_byte = (dest_word >> 24) as u8;
        let type_tag = TypeTag::from_u8(type_byte).ok_or(HarborError::UnexpectedState(type_byte))?;
        Ok(Trailer {
            source: Handle::from_raw(source),
            destination_local_id: dest_word & hub_core::handle::HANDLE_MASK,
            type_tag,
            session,
        })
    }
}

/// Encode `payload` plus `trailer` into a complete length-prefixed frame.
pub fn encode_frame(payload: &[u8], trailer: &Trailer) -> Result<Vec<u8>, HarborError> {
    let total_len = payload.len() + Trailer::LEN;
    if total_len as u64 >= MAX_FRAME_LEN as u64 {
        return Err(HarborError::FrameTooLarge(total_len as u32));
    }
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_LEN + total_len);
    buf.extend_from_slice(&(total_len as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&trailer.encode());
    Ok(buf)
}

/// Decode the 4-byte length prefix. The high byte must be zero, per the
/// spec's `< 2^24` bound; a non-zero high byte is itself the
/// `FrameTooLarge` condition rather than a separate framing error.
pub fn decode_length_prefix(bytes: [u8; LENGTH_PREFIX_LEN]) -> Result<u32, HarborError> {
    if bytes[0] != 0 {
        let len = u32::from_be_bytes(bytes);
        return Err(HarborError::FrameTooLarge(len));
    }
    let len = u32::from_be_bytes(bytes);
    if len >= MAX_FRAME_LEN || (len as usize) < Trailer::LEN {
        return Err(HarborError::FrameTooLarge(len));
    }
    Ok(len)
}

/// Split a frame's body (payload + trailer, length prefix already
/// consumed) into its payload slice and decoded trailer.
pub fn decode_frame(body: &[u8]) -> Result<(Trailer, &[u8]), HarborError> {
    if body.len() < Trailer::LEN {
        return Err(HarborError::FrameTooLarge(body.len() as u32));
    }
    let split = body.len() - Trailer::LEN;
    let trailer = Trailer::decode(&body[split..])?;
    Ok((trailer, &body[..split]))
}
