// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The harbor's socket thread: blocks in an `mio` poller, translates
//! readiness events into `Socket`-typed messages delivered to the harbor
//! service, and executes the `OutboundAction`s the harbor service's own
//! dispatch produces (connects and writes).
//!
//! Grounded on the "Socket" thread named in `spec.md` §4.5 ("blocks in
//! the external I/O poller; translates ready events into socket messages
//! ... returns 0 to request shutdown"). `mio` is the concrete poller —
//! see `DESIGN.md` for why it was chosen over a bespoke implementation.

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use hub_core::{Handle, Message, Payload, TypeTag};
use hub_runtime::Scheduler;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::warn;

use crate::service::OutboundAction;

/// The kind of socket event folded into a `Socket`-typed message's
/// payload. Encoded as `[kind_byte, node_id, ..data]` — a small binary
/// format, not text, matching the source's use of an opaque internal
/// struct for socket messages rather than the text vocabulary used for
/// harbor control commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Connected(u8),
    /// A new inbound connection was accepted, tracked under this fd
    /// (really the socket thread's internal token number). Its peer node
    /// id is not yet known — identifying it is outside this crate's
    /// scope; once something external decides the id, it reaches the
    /// harbor service as an `A <fd> <id>` control command.
    Accepted(u64),
    Data(u8, Vec<u8>),
    Down(u8),
}

impl SocketEvent {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            SocketEvent::Connected(id) => vec![0, *id],
            SocketEvent::Accepted(fd) => {
                let mut v = vec![1];
                v.extend_from_slice(&fd.to_be_bytes());
                v
            }
            SocketEvent::Data(id, bytes) => {
                let mut v = vec![2, *id];
                v.extend_from_slice(bytes);
                v
            }
            SocketEvent::Down(id) => vec![3, *id],
        }
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (&kind, rest) = bytes.split_first()?;
        match kind {
            0 => {
                let (&node_id, _) = rest.split_first()?;
                Some(SocketEvent::Connected(node_id))
            }
            1 => {
                if rest.len() < 8 {
                    return None;
                }
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&rest[..8]);
                Some(SocketEvent::Accepted(u64::from_be_bytes(buf)))
            }
            2 => {
                let (&node_id, rest) = rest.split_first()?;
                Some(SocketEvent::Data(node_id, rest.to_vec()))
            }
            3 => {
                let (&node_id, _) = rest.split_first()?;
                Some(SocketEvent::Down(node_id))
            }
            _ => None,
        }
    }

    pub fn into_message(self, harbor_handle: Handle) -> Message {
        Message::new(
            Handle::NONE,
            harbor_handle,
            0,
            TypeTag::Socket,
            Some(Payload::owned(self.encode())),
        )
    }
}

const LISTENER_TOKEN: Token = Token(0);
const POLL_TIMEOUT: Duration = Duration::from_millis(200);
const READ_BUF_LEN: usize = 64 * 1024;

/// Runs the socket thread's event loop until `shutting_down` is set.
/// `peer_addrs` maps a node id to the address to dial when the harbor
/// service issues `OutboundAction::Connect`. A bound listener is
/// optional — a node with no inbound peers may omit it.
pub fn run(
    harbor_handle: Handle,
    scheduler: Arc<Scheduler>,
    actions: Receiver<OutboundAction>,
    peer_addrs: HashMap<u8, SocketAddr>,
    listen_addr: Option<SocketAddr>,
    shutting_down: Arc<AtomicBool>,
) -> std::io::Result<()> {
    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(256);

    let mut listener = match listen_addr {
        Some(addr) => {
            let mut l = TcpListener::bind(addr)?;
            poll.registry()
                .register(&mut l, LISTENER_TOKEN, Interest::READABLE)?;
            Some(l)
        }
        None => None,
    };

    let mut next_token = 1usize;
    let mut streams: HashMap<Token, TcpStream> = HashMap::new();
    let mut token_to_node: HashMap<Token, u8> = HashMap::new();
    let mut node_to_token: HashMap<u8, Token> = HashMap::new();

    while !shutting_down.load(Ordering::SeqCst) {
        if let Err(e) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            if e.kind() == ErrorKind::Interrupted {
                continue;
            }
            return Err(e);
        }

        for event in events.iter() {
            if event.token() == LISTENER_TOKEN {
                if let Some(listener) = listener.as_mut() {
                    accept_loop(
                        listener,
                        &mut poll,
                        &mut next_token,
                        &mut streams,
                        harbor_handle,
                        &scheduler,
                    );
                }
                continue;
            }
            let token = event.token();
            if event.is_readable() {
                read_ready(
                    token,
                    &mut streams,
                    &token_to_node,
                    harbor_handle,
                    &scheduler,
                );
            }
            if event.is_error() || (event.is_read_closed() && !event.is_readable()) {
                if let Some(&node_id) = token_to_node.get(&token) {
                    scheduler.send(SocketEvent::Down(node_id).into_message(harbor_handle));
                    node_to_token.remove(&node_id);
                }
                streams.remove(&token);
                token_to_node.remove(&token);
            }
        }

        drain_actions(
            &actions,
            &peer_addrs,
            &mut poll,
            &mut next_token,
            &mut streams,
            &mut token_to_node,
            &mut node_to_token,
            harbor_handle,
            &scheduler,
        );
    }
    Ok(())
}

fn accept_loop(
    listener: &mut TcpListener,
    poll: &mut Poll,
    next_token: &mut usize,
    streams: &mut HashMap<Token, TcpStream>,
    harbor_handle: Handle,
    scheduler: &Arc<Scheduler>,
) {
    loop {
        match listener.accept() {
            Ok((mut stream, _addr)) => {
                let token = Token(*next_token);
                *next_token += 1;
                if poll
                    .registry()
                    .register(&mut stream, token, Interest::READABLE)
                    .is_ok()
                {
                    streams.insert(token, stream);
                    // The peer's node id is not yet known here: reads for
                    // this token are parked (see `read_ready`'s guard)
                    // until an `A <fd> <id>` command arrives and binds it
                    // — see `drain_actions`'s `BindAccepted` handling.
                    scheduler.send(SocketEvent::Accepted(token.0 as u64).into_message(harbor_handle));
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(_) => break,
        }
    }
}

fn read_ready(
    token: Token,
    streams: &mut HashMap<Token, TcpStream>,
    token_to_node: &HashMap<Token, u8>,
    harbor_handle: Handle,
    scheduler: &Arc<Scheduler>,
) {
    let Some(stream) = streams.get_mut(&token) else {
        return;
    };
    let Some(&node_id) = token_to_node.get(&token) else {
        return;
    };
    let mut buf = [0u8; READ_BUF_LEN];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => {
                scheduler.send(SocketEvent::Down(node_id).into_message(harbor_handle));
                break;
            }
            Ok(n) => {
                scheduler.send(SocketEvent::Data(node_id, buf[..n].to_vec()).into_message(harbor_handle));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) => {
                warn!(node_id, error = %e, "harbor socket read error");
                scheduler.send(SocketEvent::Down(node_id).into_message(harbor_handle));
                break;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn drain_actions(
    actions: &Receiver<OutboundAction>,
    peer_addrs: &HashMap<u8, SocketAddr>,
    poll: &mut Poll,
    next_token: &mut usize,
    streams: &mut HashMap<Token, TcpStream>,
    token_to_node: &mut HashMap<Token, u8>,
    node_to_token: &mut HashMap<u8, Token>,
    harbor_handle: Handle,
    scheduler: &Arc<Scheduler>,
) {
    while let Ok(action) = actions.try_recv() {
        match action {
            OutboundAction::Connect { node_id } => {
                let Some(&addr) = peer_addrs.get(&node_id) else {
                    warn!(node_id, "no configured address for peer");
                    continue;
                };
                match TcpStream::connect(addr) {
                    Ok(mut stream) => {
                        let token = Token(*next_token);
                        *next_token += 1;
                        if poll
                            .registry()
                            .register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)
                            .is_ok()
                        {
                            streams.insert(token, stream);
                            token_to_node.insert(token, node_id);
                            node_to_token.insert(node_id, token);
                            scheduler.send(SocketEvent::Connected(node_id).into_message(harbor_handle));
                        }
                    }
                    Err(e) => {
                        warn!(node_id, error = %e, "harbor connect failed");
                        scheduler.send(SocketEvent::Down(node_id).into_message(harbor_handle));
                    }
                }
            }
            OutboundAction::Write { node_id, bytes } => {
                if let Some(token) = node_to_token.get(&node_id) {
                    if let Some(stream) = streams.get_mut(token) {
                        if let Err(e) = stream.write_all(&bytes) {
                            warn!(node_id, error = %e, "harbor socket write error");
                            scheduler.send(SocketEvent::Down(node_id).into_message(harbor_handle));
                        }
                    }
                } else {
                    warn!(node_id, "write requested for unconnected peer");
                }
            }
            OutboundAction::BindAccepted { fd, node_id } => {
                let token = Token(fd as usize);
                if !streams.contains_key(&token) {
                    warn!(fd, node_id, "bind requested for unknown accepted fd");
                    continue;
                }
                if let Some(stream) = streams.get_mut(&token) {
                    let _ = poll
                        .registry()
                        .reregister(stream, token, Interest::READABLE | Interest::WRITABLE);
                }
                token_to_node.insert(token, node_id);
                node_to_token.insert(node_id, token);
                // Drain any bytes the peer sent while the connection was
                // still unidentified (e.g. its handshake byte) before the
                // next readiness edge would otherwise be the only signal.
                read_ready(token, streams, token_to_node, harbor_handle, scheduler);
            }
        }
    }
}
