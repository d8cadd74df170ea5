// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The harbor service: control-command handling (`N`/`S`/`A`), outbound
//! routing (address- and name-based), and inbound frame delivery.
//!
//! Grounded on `service_harbor.c::mainloop`/`harbor_command`/
//! `remote_send_handle`/`remote_send_name`. The original splits this
//! logic across the C harbor service and a Lua "slave" helper that owns
//! reconnect policy and cluster-master name queries; this workspace has
//! no embedded scripting engine, so — per the Open Question decision in
//! `DESIGN.md` — that helper's vocabulary (`N`/`S`/`A`/`D`/`Q`) is folded
//! directly into this service as the synchronous state transitions below,
//! rather than split into a second process-internal service.

use std::collections::HashMap;

use hub_core::error::HarborError;
use hub_core::{Handle, Message, Payload, TypeTag};
use hub_wire::{encode_frame, Trailer};
use tracing::warn;

use crate::name_table::NameTable;
use crate::peer::{PeerEvent, PeerLink, PeerStatus};

/// Something the harbor service needs the socket thread to do, since the
/// harbor service itself never touches a file descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    /// Write framed bytes to the peer's socket.
    Write { node_id: u8, bytes: Vec<u8> },
    /// Open an outbound connection to the peer (the socket thread owns
    /// address resolution for node ids).
    Connect { node_id: u8 },
    /// Bind an already-accepted, not-yet-identified connection (tracked
    /// by the socket thread under `fd`) to `node_id`, once something
    /// external has identified it — the `A <fd> <id>` command's effect.
    BindAccepted { fd: u64, node_id: u8 },
}

/// What happened to a message handed to [`HarborService::route`].
pub enum RouteOutcome {
    /// The destination is actually local; the caller should route it
    /// through the scheduler directly instead (address-based fast path).
    Local(Message),
    /// The frame was queued or handed off for sending.
    Sent,
    /// The peer link is down; the caller must reply `ERROR` to the
    /// original sender on the original session, per the failure
    /// semantics in the spec.
    Unreachable { source: Handle, session: u32 },
    /// Framing failed (e.g. oversized payload).
    FrameError(HarborError),
}

/// The harbor router: owns every peer link and the name table. Driven
/// synchronously — only ever touched from the harbor service's own
/// dispatch, so no internal locking is needed (the registry/scheduler
/// already guarantee at most one thread executes this at a time).
pub struct HarborService {
    local_node: u8,
    peers: HashMap<u8, PeerLink>,
    names: NameTable,
    actions: Vec<OutboundAction>,
}

impl HarborService {
    pub fn new(local_node: u8) -> Self {
        HarborService {
            local_node,
            peers: HashMap::new(),
            names: NameTable::new(),
            actions: Vec::new(),
        }
    }

    fn peer_mut(&mut self, node_id: u8) -> &mut PeerLink {
        self.peers
            .entry(node_id)
            .or_insert_with(|| PeerLink::new(node_id))
    }

    /// Drain every action the caller must carry out against real sockets
    /// (writes, connects) since the last call.
    pub fn drain_actions(&mut self) -> Vec<OutboundAction> {
        std::mem::take(&mut self.actions)
    }

    /// Parse and apply a text control command: `N <name> <handle>`,
    /// `S <fd> <id>`, or `A <fd> <id>`. `S`'s `fd` token is accepted for
    /// wire compatibility but unused — this workspace's socket thread
    /// always owns the outbound connect itself. `A`'s `fd` is load
    /// bearing: it names which already-accepted, unidentified connection
    /// the socket thread should now bind to `id`.
    pub fn handle_command(&mut self, text: &str) -> Vec<Message> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        match tokens.as_slice() {
            ["N", name, handle_hex] => match u32::from_str_radix(handle_hex.trim_start_matches("0x"), 16) {
                Ok(raw) => self.register_name(name, Handle::from_raw(raw)),
                Err(_) => {
                    warn!(command = text, "malformed N command");
                    Vec::new()
                }
            },
            ["S", _fd, id] => {
                if let Ok(node_id) = id.parse::<u8>() {
                    self.request_connect(node_id);
                }
                Vec::new()
            }
            ["A", fd, id] => {
                if let (Ok(fd), Ok(node_id)) = (fd.parse::<u64>(), id.parse::<u8>()) {
                    self.on_accepted(fd, node_id);
                } else {
                    warn!(command = text, "malformed A command");
                }
                Vec::new()
            }
            _ => {
                warn!(command = text, "unrecognized harbor command");
                Vec::new()
            }
        }
    }

    /// `N <name> <handle>`: bind a global name, flushing any pending
    /// queue for it. Flushed messages have their destination rewritten to
    /// the now-resolved handle — they were queued with whatever
    /// destination the sender had before resolution (typically none).
    pub fn register_name(&mut self, name: &str, handle: Handle) -> Vec<Message> {
        let mut flushed = self.names.register(name, handle);
        for msg in &mut flushed {
            msg.destination = handle;
        }
        flushed
    }

    /// `S <fd> <id>`: initiate an outbound connection and start the
    /// handshake once the socket thread reports success via
    /// [`Self::on_connected`].
    pub fn request_connect(&mut self, node_id: u8) {
        self.peer_mut(node_id);
        self.actions.push(OutboundAction::Connect { node_id });
    }

    /// The socket thread successfully opened an outbound connection.
    pub fn on_connected(&mut self, node_id: u8) {
        self.peer_mut(node_id).attach();
        self.send_handshake(node_id);
    }

    /// `A <fd> <id>`: an already-accepted connection (tracked by the
    /// socket thread under `fd`) has been identified as peer `node_id` by
    /// whatever external mechanism decides that (cluster membership is
    /// out of scope here — see the module docs). Binds the connection to
    /// the peer slot and starts the handshake.
    pub fn on_accepted(&mut self, fd: u64, node_id: u8) {
        self.peer_mut(node_id).attach();
        self.actions.push(OutboundAction::BindAccepted { fd, node_id });
        self.send_handshake(node_id);
    }

    fn send_handshake(&mut self, node_id: u8) {
        self.actions.push(OutboundAction::Write {
            node_id,
            bytes: vec![self.local_node],
        });
    }

    /// Bytes arrived from the peer's socket. Returns every locally
    /// deliverable message the newly parsed frames produced; logs and
    /// tears down the link on a handshake mismatch or a framing error.
    pub fn on_data(&mut self, node_id: u8, bytes: &[u8]) -> Vec<Message> {
        let events = self.peer_mut(node_id).feed(bytes);
        let mut messages = Vec::new();
        for event in events {
            match event {
                PeerEvent::HandshakeByte(actual) => match hub_wire::handshake::verify(node_id, actual) {
                    Ok(()) => {
                        self.peer_mut(node_id).handshake_complete();
                        for frame in self.peer_mut(node_id).drain_outbound() {
                            self.actions.push(OutboundAction::Write { node_id, bytes: frame });
                        }
                    }
                    Err(e) => {
                        warn!(node_id, actual, error = %e, "harbor handshake mismatch");
                        self.peer_mut(node_id).mark_down();
                    }
                },
                PeerEvent::Frame { trailer, payload } => {
                    messages.push(self.deliver_frame(trailer, payload));
                }
                PeerEvent::FrameError(e) => {
                    warn!(node_id, error = %e, "harbor frame error, closing link");
                }
            }
        }
        messages
    }

    /// `forward_local_messsage`: rehome the frame's local-only
    /// destination under our own node id and reconstruct a `Message`.
    fn deliver_frame(&self, trailer: Trailer, payload: Vec<u8>) -> Message {
        let destination = Handle::from_raw(trailer.destination_local_id).with_node(self.local_node);
        Message::new(
            trailer.source,
            destination,
            trailer.session,
            trailer.type_tag,
            Some(Payload::owned(payload)),
        )
    }

    /// The socket thread reports the peer's connection closed or errored:
    /// `D <id>` in the source's vocabulary.
    pub fn on_down(&mut self, node_id: u8) {
        self.peer_mut(node_id).mark_down();
    }

    /// Address-based outbound routing for a message whose destination's
    /// node id is not the local node.
    pub fn route(&mut self, msg: Message) -> RouteOutcome {
        let node_id = msg.destination.node_id();
        if node_id == 0 || node_id == self.local_node {
            return RouteOutcome::Local(msg);
        }

        let trailer = Trailer {
            source: msg.source,
            destination_local_id: msg.destination.local_id(),
            type_tag: msg.type_tag,
            session: msg.session,
        };
        let payload_bytes = msg.payload.as_ref().map(Payload::as_bytes).unwrap_or(&[]);
        let frame = match encode_frame(payload_bytes, &trailer) {
            Ok(f) => f,
            Err(e) => return RouteOutcome::FrameError(e),
        };

        let status = self.peer_mut(node_id).status();
        match status {
            PeerStatus::Down => RouteOutcome::Unreachable {
                source: msg.source,
                session: msg.session,
            },
            PeerStatus::Wait | PeerStatus::Handshake => {
                self.peer_mut(node_id).queue_outbound(frame);
                RouteOutcome::Sent
            }
            PeerStatus::Header | PeerStatus::Content => {
                self.actions.push(OutboundAction::Write { node_id, bytes: frame });
                RouteOutcome::Sent
            }
        }
    }

    /// Name-based outbound routing: resolve `name` and delegate to
    /// address-based routing, or queue on the name's pending list and ask
    /// the caller to issue `Q <name>` (no cluster master exists in this
    /// workspace; the caller is expected to log or surface this for an
    /// external resolver).
    pub fn route_by_name(&mut self, name: &str, msg: Message) -> NameRouteOutcome {
        match self.names.resolve(name) {
            Some(handle) => {
                let mut msg = msg;
                msg.destination = handle;
                NameRouteOutcome::Resolved(self.route(msg))
            }
            None => {
                let is_new_name = self.names.enqueue_pending(name, msg);
                if is_new_name {
                    NameRouteOutcome::QueryNeeded
                } else {
                    NameRouteOutcome::Queued
                }
            }
        }
    }
}

pub enum NameRouteOutcome {
    Resolved(RouteOutcome),
    Queued,
    /// First time this name was seen: caller should emit `Q <name>`.
    QueryNeeded,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::TypeTag;

    #[test]
    fn handshake_then_route_flushes_queued_frame() {
        let mut harbor = HarborService::new(1);
        let msg = Message::new(Handle::new(1, 9), Handle::new(2, 5), 3, TypeTag::Text, None);
        // Not connected yet: queued.
        assert!(matches!(harbor.route(msg), RouteOutcome::Sent));
        assert!(harbor.drain_actions().is_empty());

        harbor.on_accepted(7, 2);
        let actions = harbor.drain_actions();
        assert!(actions.iter().any(|a| matches!(a, OutboundAction::Write { node_id: 2, .. })));

        let messages = harbor.on_data(2, &[2]);
        assert!(messages.is_empty());
        let flushed = harbor.drain_actions();
        assert!(flushed.iter().any(|a| matches!(a, OutboundAction::Write { node_id: 2, .. })));
    }

    #[test]
    fn down_peer_reports_unreachable() {
        let mut harbor = HarborService::new(1);
        harbor.on_accepted(7, 2);
        harbor.drain_actions();
        harbor.on_down(2);
        let msg = Message::new(Handle::new(1, 9), Handle::new(2, 5), 3, TypeTag::Text, None);
        match harbor.route(msg) {
            RouteOutcome::Unreachable { session, .. } => assert_eq!(session, 3),
            _ => panic!("expected unreachable"),
        }
    }

    #[test]
    fn name_command_flushes_pending_queue() {
        let mut harbor = HarborService::new(1);
        let msg = Message::new(Handle::NONE, Handle::NONE, 1, TypeTag::Text, None);
        assert!(matches!(
            harbor.route_by_name("svc", msg),
            NameRouteOutcome::QueryNeeded
        ));
        let flushed = harbor.handle_command("N svc 0x02000005");
        assert_eq!(flushed.len(), 1);
    }

    #[test]
    fn local_destination_is_routed_locally() {
        let mut harbor = HarborService::new(1);
        let msg = Message::new(Handle::new(1, 9), Handle::new(1, 5), 1, TypeTag::Text, None);
        assert!(matches!(harbor.route(msg), RouteOutcome::Local(_)));
    }
}
