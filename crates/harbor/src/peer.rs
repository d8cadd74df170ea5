// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-peer link state machine and read-buffer accumulation.
//!
//! Grounded on `service_harbor.c::push_socket_data`: a peer slot starts in
//! `Wait` (attached but nothing sent), moves to `Handshake` once a socket
//! is assigned, reads exactly one id byte, then alternates `Header`
//! (4-byte length prefix) / `Content` (the frame body) for as long as the
//! link is up. Any protocol violation or I/O error moves the slot to
//! `Down`, after which sends are rejected rather than attempted.

use std::collections::VecDeque;

use hub_core::error::HarborError;
use hub_wire::{decode_frame, decode_length_prefix, Trailer, LENGTH_PREFIX_LEN};

/// Link status, matching the source's `{WAIT, HANDSHAKE, HEADER,
/// CONTENT, DOWN}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Wait,
    Handshake,
    Header,
    Content,
    Down,
}

/// Something a peer link's read buffer produced after absorbing new
/// bytes.
#[derive(Debug)]
pub enum PeerEvent {
    /// The peer's one-byte handshake id arrived; the caller must verify
    /// it against the expected node id and either advance to `Header` or
    /// tear the link down.
    HandshakeByte(u8),
    /// A complete frame arrived.
    Frame { trailer: Trailer, payload: Vec<u8> },
    /// The length prefix or trailer failed to decode; the link must be
    /// torn down.
    FrameError(HarborError),
}

/// One peer node's link: its state, queued outbound frames (for when the
/// link is not yet ready to write), and its inbound read buffer.
pub struct PeerLink {
    node_id: u8,
    status: PeerStatus,
    send_queue: VecDeque<Vec<u8>>,
    read_buf: Vec<u8>,
    /// Bytes still needed before the current state's unit (handshake
    /// byte, length prefix, or frame body) is complete.
    awaiting: usize,
}

impl PeerLink {
    pub fn new(node_id: u8) -> Self {
        PeerLink {
            node_id,
            status: PeerStatus::Wait,
            send_queue: VecDeque::new(),
            read_buf: Vec::new(),
            awaiting: 1,
        }
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn status(&self) -> PeerStatus {
        self.status
    }

    pub fn is_down(&self) -> bool {
        self.status == PeerStatus::Down
    }

    /// A socket has just been assigned to this slot (outbound connect or
    /// inbound accept): move from `Wait` to `Handshake`.
    pub fn attach(&mut self) {
        self.status = PeerStatus::Handshake;
        self.awaiting = 1;
    }

    /// The local handshake byte was verified: move to `Header` so
    /// subsequent reads parse length-prefixed frames.
    pub fn handshake_complete(&mut self) {
        self.status = PeerStatus::Header;
        self.awaiting = LENGTH_PREFIX_LEN;
    }

    pub fn mark_down(&mut self) {
        self.status = PeerStatus::Down;
        self.send_queue.clear();
        self.read_buf.clear();
    }

    /// Queue a fully-framed outbound message. Used when the link is not
    /// yet in `Header`/`Content` (still handshaking) so nothing would be
    /// written until the link is ready.
    pub fn queue_outbound(&mut self, frame: Vec<u8>) {
        self.send_queue.push_back(frame);
    }

    /// Drain everything queued for writing, in order.
    pub fn drain_outbound(&mut self) -> Vec<Vec<u8>> {
        self.send_queue.drain(..).collect()
    }

    /// Absorb newly received bytes, returning every event the buffer's
    /// contents now produce (zero or more handshake bytes / frames /
    /// errors — a single read can contain several frames back to back).
    #[allow(clippy::expect_used)]
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<PeerEvent> {
        self.read_buf.extend_from_slice(bytes);
        let mut events = Vec::new();
        loop {
            if self.status == PeerStatus::Down {
                break;
            }
            if self.read_buf.len() < self.awaiting {
                break;
            }
            match self.status {
                PeerStatus::Wait => break,
                PeerStatus::Handshake => {
                    let byte = self.read_buf[0];
                    self.consume(1);
                    events.push(PeerEvent::HandshakeByte(byte));
                    // Caller decides whether to call `handshake_complete`;
                    // stop feeding until it does, since we don't yet know
                    // whether the handshake succeeded.
                    break;
                }
                PeerStatus::Header => {
                    let prefix: [u8; LENGTH_PREFIX_LEN] =
                        self.read_buf[0..LENGTH_PREFIX_LEN].try_into().expect("length checked above");
                    match decode_length_prefix(prefix) {
                        Ok(len) => {
                            self.consume(LENGTH_PREFIX_LEN);
                            self.status = PeerStatus::Content;
                            self.awaiting = len as usize;
                        }
                        Err(e) => {
                            self.mark_down();
                            events.push(PeerEvent::FrameError(e));
                            break;
                        }
                    }
                }
                PeerStatus::Content => {
                    let body: Vec<u8> = self.read_buf[0..self.awaiting].to_vec();
                    self.consume(self.awaiting);
                    match decode_frame(&body) {
                        Ok((trailer, payload)) => {
                            events.push(PeerEvent::Frame {
                                trailer,
                                payload: payload.to_vec(),
                            });
                        }
                        Err(e) => {
                            self.mark_down();
                            events.push(PeerEvent::FrameError(e));
                            break;
                        }
                    }
                    self.status = PeerStatus::Header;
                    self.awaiting = LENGTH_PREFIX_LEN;
                }
                PeerStatus::Down => break,
            }
        }
        events
    }

    fn consume(&mut self, n: usize) {
        self.read_buf.drain(0..n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_byte_is_reported_once() {
        let mut link = PeerLink::new(2);
        link.attach();
        let events = link.feed(&[5]);
        assert!(matches!(events.as_slice(), [PeerEvent::HandshakeByte(5)]));
    }

    #[test]
    fn single_frame_round_trips_through_feed() {
        let mut link = PeerLink::new(2);
        link.attach();
        link.feed(&[2]);
        link.handshake_complete();

        let trailer = Trailer {
            source: hub_core::Handle::new(1, 3),
            destination_local_id: 7,
            type_tag: hub_core::TypeTag::Text,
            session: 1,
        };
        let frame = hub_wire::encode_frame(b"hi", &trailer).unwrap();
        let events = link.feed(&frame);
        match events.as_slice() {
            [PeerEvent::Frame { trailer: t, payload }] => {
                assert_eq!(payload, b"hi");
                assert_eq!(t.session, 1);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut link = PeerLink::new(2);
        link.attach();
        link.feed(&[2]);
        link.handshake_complete();

        let trailer = Trailer {
            source: hub_core::Handle::new(1, 3),
            destination_local_id: 7,
            type_tag: hub_core::TypeTag::Text,
            session: 1,
        };
        let frame = hub_wire::encode_frame(b"hello world", &trailer).unwrap();
        let (first, second) = frame.split_at(frame.len() - 3);
        assert!(link.feed(first).is_empty());
        let events = link.feed(second);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn two_frames_back_to_back_both_reported() {
        let mut link = PeerLink::new(2);
        link.attach();
        link.feed(&[2]);
        link.handshake_complete();

        let trailer = Trailer {
            source: hub_core::Handle::new(1, 3),
            destination_local_id: 7,
            type_tag: hub_core::TypeTag::Text,
            session: 1,
        };
        let mut bytes = hub_wire::encode_frame(b"a", &trailer).unwrap();
        bytes.extend(hub_wire::encode_frame(b"b", &trailer).unwrap());
        let events = link.feed(&bytes);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn bad_length_prefix_marks_link_down() {
        let mut link = PeerLink::new(2);
        link.attach();
        link.feed(&[2]);
        link.handshake_complete();

        let events = link.feed(&[0xff, 0, 0, 0]);
        assert!(matches!(events.as_slice(), [PeerEvent::FrameError(_)]));
        assert!(link.is_down());
    }
}
