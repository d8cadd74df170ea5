// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker pool: drains the global FIFO with weighted fairness,
//! routes sends (including the `ServiceNotFound` conversion to reply
//! messages), and runs the idle/signal protocol workers use to sleep
//! when there is no work.
//!
//! Grounded on `spec.md` §4.2/§4.5 and, for the global-FIFO mechanics,
//! `skynet_mq.c`'s `skynet_globalmq_push/pop`; the `cond_wait`/spin-lock
//! pair in the source becomes `parking_lot::{Mutex, Condvar}` here, the
//! same pair the teacher's own daemon lifecycle code uses for shutdown
//! signaling.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use hub_core::{FatalError, GlobalQueue, Handle, Message, ServiceNotFound, TypeTag};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::context::{Flow, ServiceContext};
use crate::registry::Registry;
use crate::watchdog::MonitorSlot;

/// What happened when a message was handed to the node's remote router
/// because its destination's node id was not the local one.
pub enum RemoteOutcome {
    /// The router recognized the destination as local after all (e.g. the
    /// local node id changed, or the router folds node 0 in); the caller
    /// should fall through to ordinary local delivery.
    Local(Message),
    /// The message was queued or written out.
    Sent,
    /// The peer is unreachable; the caller replies `ERROR` on the
    /// original session if it was non-zero.
    Unreachable { source: Handle, session: u32 },
    /// Framing the message failed.
    FrameError,
}

/// The seam a cross-node router (the harbor service) plugs into. Kept as
/// a trait here, rather than a dependency on the harbor crate directly,
/// since `hub-harbor` depends on `hub-runtime` and not the other way
/// around.
pub trait RemoteRouter: Send + Sync {
    fn route(&self, msg: Message) -> RemoteOutcome;
}

/// Worker weight: `-1` processes exactly one message per turn (latency
/// preferring), `0` tries to drain the queue fully, `n >= 1` processes
/// `ceil(length / 2^n)` messages (throughput preferring). Workers beyond
/// the configured table default to `0`.
pub type Weight = i8;

/// The default weight table: hand-tuned only in the sense that *some*
/// workers prefer latency and others throughput, per the design notes —
/// the concrete values are not load-bearing beyond that property.
pub fn default_weights(worker_count: usize) -> Vec<Weight> {
    let pattern: [Weight; 8] = [-1, -1, 0, 0, 1, 1, 2, 3];
    (0..worker_count)
        .map(|i| pattern.get(i).copied().unwrap_or(0))
        .collect()
}

/// How many messages a worker should pop this turn given its weight and
/// the queue's length at the start of the turn.
pub fn quota_for(weight: Weight, length: usize) -> usize {
    if length == 0 {
        return 0;
    }
    match weight {
        w if w < 0 => 1,
        0 => length,
        w => {
            let denom = 1usize << (w as u32);
            length.div_ceil(denom).max(1)
        }
    }
}

struct SchedulerState {
    sleep_count: usize,
    quit: bool,
}

/// Owns the global FIFO, the registry, and the idle/signal condvar. One
/// `Scheduler` is shared (via `Arc`) by every worker, the timer thread,
/// and the harbor/socket thread.
pub struct Scheduler {
    registry: Arc<Registry>,
    global: Arc<GlobalQueue>,
    weights: Vec<Weight>,
    state: Mutex<SchedulerState>,
    condvar: Condvar,
    /// Number of live (non-retired) services; workers exit their loop
    /// when this reaches zero, per the shutdown-ordering rule in §4.5.
    service_total: AtomicI64,
    local_node: u8,
    remote: Mutex<Option<Arc<dyn RemoteRouter>>>,
    /// Mirrors `spec.md` §6 `profile`: when set, [`Self::drain_one_turn`]
    /// times each handler call and feeds the result into the context's
    /// `cpu_cost_accumulator`. Left off, dispatch never touches a clock.
    profile: bool,
}

impl Scheduler {
    pub fn new(registry: Arc<Registry>, weights: Vec<Weight>, local_node: u8) -> Arc<Self> {
        Self::with_profile(registry, weights, local_node, false)
    }

    pub fn with_profile(
        registry: Arc<Registry>,
        weights: Vec<Weight>,
        local_node: u8,
        profile: bool,
    ) -> Arc<Self> {
        Arc::new(Scheduler {
            registry,
            global: Arc::new(GlobalQueue::new()),
            weights,
            state: Mutex::new(SchedulerState {
                sleep_count: 0,
                quit: false,
            }),
            condvar: Condvar::new(),
            service_total: AtomicI64::new(0),
            local_node,
            remote: Mutex::new(None),
            profile,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn local_node(&self) -> u8 {
        self.local_node
    }

    /// Install the cross-node router (the harbor service). A node that
    /// never enables harbor routing leaves this unset; sends to a remote
    /// node id are then treated as unreachable.
    pub fn set_remote_router(&self, router: Arc<dyn RemoteRouter>) {
        *self.remote.lock() = Some(router);
    }

    fn weight_for(&self, worker_index: usize) -> Weight {
        self.weights.get(worker_index).copied().unwrap_or(0)
    }

    /// Register a new service and activate its queue. Matches
    /// `create`+bootstrap-push: the queue starts `in_global` so it is not
    /// scheduled until this call splices it in after init.
    pub fn register(&self, handler: Box<dyn crate::context::Service>) -> Arc<ServiceContext> {
        let handler = Mutex::new(Some(handler));
        let ctx = self
            .registry
            .register(|handle| {
                #[allow(clippy::expect_used)]
                let handler = handler.lock().take().expect("build called exactly once");
                ServiceContext::new(handle, handler)
            })
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, fatal = %FatalError::Overflow, "handle table overflow during register");
                std::process::exit(1);
            });
        self.service_total.fetch_add(1, Ordering::SeqCst);
        ctx.queue().activate(&self.global);
        ctx
    }

    /// Retire a service: remove it from the registry, mark its queue for
    /// release, and ensure the queue will be drained by a worker.
    pub fn retire(&self, handle: Handle) {
        if let Some(ctx) = self.registry.retire(handle) {
            self.service_total.fetch_sub(1, Ordering::SeqCst);
            if ctx.queue().mark_release() {
                self.global.push(Arc::clone(ctx.queue()));
                self.wake_one_sleeper();
            }
            if self.service_total.load(Ordering::SeqCst) <= 0 {
                self.request_quit();
            }
        }
    }

    /// Route a message to its destination. If the destination is unknown
    /// (never registered, or already retired), this is the
    /// `ServiceNotFound` path: a non-zero session gets an error reply,
    /// a zero session is dropped silently (per the open-question
    /// resolution matching the source's retired-service behavior).
    pub fn send(&self, msg: Message) {
        if !msg.destination.is_local_to(self.local_node) {
            let router = self.remote.lock().clone();
            match router {
                Some(router) => {
                    let msg = match router.route(msg) {
                        RemoteOutcome::Sent => return,
                        RemoteOutcome::Unreachable { source, session } => {
                            if session != 0 {
                                self.send(Message::error_reply(source, session));
                            }
                            return;
                        }
                        RemoteOutcome::FrameError => {
                            warn!("harbor framing error routing outbound message");
                            return;
                        }
                        RemoteOutcome::Local(msg) => msg,
                    };
                    self.send_local(msg);
                    return;
                }
                None => {
                    warn!(destination = %msg.destination, "no harbor configured for remote destination");
                    if msg.session != 0 {
                        self.send(Message::error_reply(msg.source, msg.session));
                    }
                    return;
                }
            }
        }
        self.send_local(msg);
    }

    fn send_local(&self, msg: Message) {
        let Some(ctx) = self.registry.grab(msg.destination) else {
            if msg.session != 0 && msg.type_tag != TypeTag::Error {
                let not_found = ServiceNotFound(msg.destination.raw());
                warn!(session = msg.session, error = %not_found, "service not found");
                self.send(Message::error_reply(msg.source, msg.session));
            } else {
                debug!(destination = %msg.destination, "dropping message to unknown service");
            }
            return;
        };
        if ctx.queue().push(msg) {
            self.global.push(Arc::clone(ctx.queue()));
            self.wake_one_sleeper();
        }
    }

    fn wake_one_sleeper(&self) {
        let state = self.state.lock();
        if state.sleep_count > 0 {
            self.condvar.notify_one();
        }
    }

    pub fn request_quit(&self) {
        let mut state = self.state.lock();
        state.quit = true;
        self.condvar.notify_all();
    }

    pub fn is_quitting(&self) -> bool {
        self.state.lock().quit
    }

    /// Pop a queue to work on, sleeping on the idle condition if the
    /// global FIFO is empty. Returns `None` only once shutdown has been
    /// requested and there is truly nothing left to pop.
    fn pop_global_or_sleep(&self) -> Option<Arc<hub_core::MessageQueue>> {
        loop {
            if let Some(q) = self.global.pop() {
                return Some(q);
            }
            let mut state = self.state.lock();
            if state.quit {
                return None;
            }
            state.sleep_count += 1;
            self.condvar.wait(&mut state);
            state.sleep_count -= 1;
        }
    }

    /// One worker's main loop. Runs until shutdown, dispatching messages
    /// from whatever queue it is handed according to its weight.
    pub fn run_worker(&self, worker_index: usize, monitor: &MonitorSlot) {
        let weight = self.weight_for(worker_index);
        while let Some(queue) = self.pop_global_or_sleep() {
            self.drain_one_turn(&queue, weight, monitor);
        }
    }

    /// Process one scheduling turn for `queue`: look up its destination
    /// context (or drain-for-release it if the context is already gone),
    /// pop up to the worker's quota of messages, then decide whether to
    /// requeue the queue onto the global FIFO tail.
    fn drain_one_turn(
        &self,
        queue: &Arc<hub_core::MessageQueue>,
        weight: Weight,
        monitor: &MonitorSlot,
    ) {
        let handle = queue.handle();
        let Some(ctx) = self.registry.grab(handle) else {
            // Context already retired and removed: this queue was pushed
            // back by `retire` purely so it gets drained one last time.
            queue.drain_for_release(|msg| {
                if msg.session != 0 {
                    self.send(Message::error_reply(msg.source, msg.session));
                }
            });
            return;
        };

        let quota = quota_for(weight, queue.len());
        let mut processed = 0usize;
        let mut exited = false;
        while processed < quota {
            let Some(msg) = queue.pop() else { break };
            monitor.trigger(msg.source, handle);

            if msg.is_system_exit() {
                ctx.mark_retiring();
                processed += 1;
                exited = true;
                break;
            }

            let flow = if ctx.is_retiring() {
                if msg.session != 0 {
                    self.send(Message::error_reply(msg.source, msg.session));
                }
                Flow::Continue
            } else if self.profile {
                let start = std::time::Instant::now();
                let flow = ctx.dispatch(msg.type_tag, msg.session, msg.source, msg.payload);
                ctx.add_cpu_cost(start.elapsed().as_nanos() as u64);
                for outgoing in ctx.take_outbox() {
                    self.send(outgoing);
                }
                flow
            } else {
                let flow = ctx.dispatch(msg.type_tag, msg.session, msg.source, msg.payload);
                for outgoing in ctx.take_outbox() {
                    self.send(outgoing);
                }
                flow
            };

            processed += 1;
            if flow == Flow::Exit {
                exited = true;
                break;
            }
        }

        if exited {
            ctx.release();
            self.retire(handle);
            return;
        }

        if queue.is_empty() {
            // `pop` already cleared `in_global` when it drained the last
            // message; nothing further to do here.
        } else {
            self.global.push(Arc::clone(queue));
        }

        if let Some(overload) = queue.take_overload() {
            warn!(service = %handle, overload, "queue overload");
        }
    }
}
