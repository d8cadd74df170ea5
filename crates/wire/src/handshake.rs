// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The one-byte harbor handshake: each side sends its own node id and
//! verifies the peer's. Grounded on `service_harbor.c::handshake`.

use hub_core::error::HarborError;

pub fn encode(local_node_id: u8) -> [u8; 1] {
    [local_node_id]
}

pub fn verify(expected_peer_id: u8, received: u8) -> Result<(), HarborError> {
    if expected_peer_id == received {
        Ok(())
    } else {
        Err(HarborError::HandshakeMismatch {
            expected: expected_peer_id,
            actual: received,
        })
    }
}
