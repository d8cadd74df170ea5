// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! hub-harbor: the cross-node router. Owns the peer link state machine,
//! the name table, and the socket thread, and plugs into the scheduler
//! both as an ordinary registered service (control commands, socket
//! events) and as the scheduler's [`hub_runtime::RemoteRouter`]
//! (address-based outbound fast path), per `spec.md` §4.6/§6.
//!
//! Grounded on `service_harbor.c`'s combined role as both a normal
//! skynet service (it has a `mainloop`/message handler) and the
//! destination `skynet_send` forwards to whenever a handle's high byte
//! names a remote node — this crate's [`Harbor`] plays both parts, the
//! first through [`HarborActor`] and the second through the
//! `RemoteRouter` impl below.

pub mod name_table;
pub mod peer;
pub mod service;
pub mod socket_thread;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use hub_core::{Handle, Message, Payload, TypeTag};
use hub_runtime::{Flow, RemoteOutcome, RemoteRouter, Scheduler, Service, ServiceContext};
use parking_lot::Mutex;
use tracing::{debug, error};

pub use crate::name_table::NameTable;
pub use crate::peer::{PeerEvent, PeerLink, PeerStatus};
pub use crate::service::{HarborService, NameRouteOutcome, OutboundAction, RouteOutcome};
pub use crate::socket_thread::SocketEvent;

/// Shared handle to the harbor's router state. The scheduler reaches it
/// as a [`RemoteRouter`] for address-based outbound routing; the
/// registered [`HarborActor`] reaches it for control commands and socket
/// events. Both share one [`HarborService`] behind a lock — the mutex is
/// what now provides the single-writer guarantee the source got for free
/// by running everything on one service's own dispatch thread (see
/// `DESIGN.md`).
pub struct Harbor {
    inner: Mutex<HarborService>,
    action_tx: Sender<OutboundAction>,
}

impl Harbor {
    fn flush(&self, inner: &mut HarborService) {
        for action in inner.drain_actions() {
            let _ = self.action_tx.send(action);
        }
    }

    pub fn handle_command(&self, text: &str) -> Vec<Message> {
        let mut inner = self.inner.lock();
        let out = inner.handle_command(text);
        self.flush(&mut inner);
        out
    }

    pub fn on_connected(&self, node_id: u8) {
        let mut inner = self.inner.lock();
        inner.on_connected(node_id);
        self.flush(&mut inner);
    }

    pub fn on_accepted(&self, fd: u64, node_id: u8) {
        let mut inner = self.inner.lock();
        inner.on_accepted(fd, node_id);
        self.flush(&mut inner);
    }

    pub fn on_data(&self, node_id: u8, bytes: &[u8]) -> Vec<Message> {
        let mut inner = self.inner.lock();
        let out = inner.on_data(node_id, bytes);
        self.flush(&mut inner);
        out
    }

    pub fn on_down(&self, node_id: u8) {
        let mut inner = self.inner.lock();
        inner.on_down(node_id);
        self.flush(&mut inner);
    }

    /// Name-based outbound send: resolve `name` and route, or queue it
    /// pending resolution. Unlike ordinary address-based sends, callers
    /// reach this directly (it is not driven through `Scheduler::send`,
    /// since a name is not a `Handle`).
    pub fn send_to_name(&self, name: &str, msg: Message) -> NameRouteOutcome {
        let mut inner = self.inner.lock();
        let outcome = inner.route_by_name(name, msg);
        self.flush(&mut inner);
        outcome
    }
}

impl RemoteRouter for Harbor {
    fn route(&self, msg: Message) -> RemoteOutcome {
        let mut inner = self.inner.lock();
        let outcome = inner.route(msg);
        self.flush(&mut inner);
        match outcome {
            RouteOutcome::Local(msg) => RemoteOutcome::Local(msg),
            RouteOutcome::Sent => RemoteOutcome::Sent,
            RouteOutcome::Unreachable { source, session } => {
                RemoteOutcome::Unreachable { source, session }
            }
            RouteOutcome::FrameError(_) => RemoteOutcome::FrameError,
        }
    }
}

/// The registered service side of the harbor: receives `Harbor`-typed
/// control commands and `Socket`-typed events from the socket thread,
/// forwarding any locally deliverable message it produces back through
/// the scheduler via [`ServiceContext::send`].
pub struct HarborActor {
    harbor: Arc<Harbor>,
}

impl HarborActor {
    pub fn new(harbor: Arc<Harbor>) -> Self {
        HarborActor { harbor }
    }
}

impl Service for HarborActor {
    fn receive(
        &mut self,
        ctx: &ServiceContext,
        type_tag: TypeTag,
        _session: u32,
        _source: Handle,
        payload: Option<Payload>,
    ) -> Flow {
        match type_tag {
            TypeTag::Harbor => {
                if let Some(p) = payload.as_ref() {
                    let text = String::from_utf8_lossy(p.as_bytes());
                    for msg in self.harbor.handle_command(&text) {
                        ctx.send(msg);
                    }
                }
            }
            TypeTag::Socket => {
                if let Some(p) = payload.as_ref() {
                    match SocketEvent::decode(p.as_bytes()) {
                        Some(SocketEvent::Connected(id)) => self.harbor.on_connected(id),
                        Some(SocketEvent::Accepted(fd)) => {
                            debug!(fd, "inbound connection accepted, awaiting identification");
                        }
                        Some(SocketEvent::Data(id, bytes)) => {
                            for msg in self.harbor.on_data(id, &bytes) {
                                ctx.send(msg);
                            }
                        }
                        Some(SocketEvent::Down(id)) => self.harbor.on_down(id),
                        None => debug!("malformed socket event payload"),
                    }
                }
            }
            _ => {}
        }
        Flow::Continue
    }
}

/// A fully wired, running harbor: the shared router state, its
/// registered service handle, and its socket thread.
pub struct HarborNode {
    pub harbor: Arc<Harbor>,
    pub handle: Handle,
    shutting_down: Arc<AtomicBool>,
    socket_thread: Option<JoinHandle<()>>,
}

impl HarborNode {
    pub fn shutdown(mut self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        if let Some(handle) = self.socket_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Build the harbor's shared state, register it as a service with
/// `scheduler`, install it as the scheduler's remote router, and spawn
/// its socket thread. `peer_addrs` maps a node id to the address to dial
/// for outbound connects; `listen_addr` is the address to accept inbound
/// connections on (omit for a harbor node with no inbound peers).
#[allow(clippy::expect_used)]
pub fn start(
    scheduler: &Arc<Scheduler>,
    local_node: u8,
    peer_addrs: HashMap<u8, SocketAddr>,
    listen_addr: Option<SocketAddr>,
) -> HarborNode {
    let (action_tx, action_rx) = mpsc::channel();
    let harbor = Arc::new(Harbor {
        inner: Mutex::new(HarborService::new(local_node)),
        action_tx,
    });

    let actor = HarborActor::new(Arc::clone(&harbor));
    let ctx = scheduler.register(Box::new(actor));
    let handle = ctx.handle();

    scheduler.set_remote_router(Arc::clone(&harbor) as Arc<dyn RemoteRouter>);

    let shutting_down = Arc::new(AtomicBool::new(false));
    let thread_shutdown = Arc::clone(&shutting_down);
    let thread_scheduler = Arc::clone(scheduler);
    let socket_thread = std::thread::Builder::new()
        .name("hub-harbor-socket".to_string())
        .spawn(move || {
            if let Err(e) = socket_thread::run(
                handle,
                thread_scheduler,
                action_rx,
                peer_addrs,
                listen_addr,
                thread_shutdown,
            ) {
                error!(error = %e, "harbor socket thread exited with error");
            }
        })
        .expect("spawning the harbor socket thread should not fail");

    HarborNode {
        harbor,
        handle,
        shutting_down,
        socket_thread: Some(socket_thread),
    }
}
