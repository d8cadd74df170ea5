// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hub-wire: the harbor's pure wire codec — length-prefixed frame
//! encoding/decoding and the one-byte handshake. No sockets here; see
//! `hub-harbor` for the peer-link state machine that drives this codec.

pub mod frame;
pub mod handshake;

pub use frame::{decode_frame, decode_length_prefix, encode_frame, Trailer, LENGTH_PREFIX_LEN, MAX_FRAME_LEN};
