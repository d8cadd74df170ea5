// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-service context: a handle, a private queue, a handler behind a
//! trait object, and the bookkeeping the scheduler and watchdog need.
//!
//! `Service` is the polymorphism seam named in the design notes this spec
//! calls out: workers only ever see `Box<dyn Service>`, never a concrete
//! handler type, the same adapter-trait pattern the teacher workspace uses
//! at its own integration seams.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use hub_core::{Handle, Message, MessageQueue, Payload, TypeTag};
use parking_lot::Mutex;

/// What a handler returns after processing one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep running; more messages may be dispatched to this context.
    Continue,
    /// The service is done; the worker must retire it after this call.
    Exit,
}

/// The capability set every service implements: receive a message, and
/// release any resources when the context is torn down.
pub trait Service: Send {
    fn receive(
        &mut self,
        ctx: &ServiceContext,
        type_tag: TypeTag,
        session: u32,
        source: Handle,
        payload: Option<Payload>,
    ) -> Flow;

    /// Called once, after the queue has been fully drained post-retire.
    fn release(&mut self, _ctx: &ServiceContext) {}
}

/// Wraps a user handler with its private queue, handle, and the
/// bookkeeping fields named in the data model: CPU cost accounting (when
/// profiling is enabled), the watchdog-set endless flag, and the retiring
/// flag that gates teardown.
pub struct ServiceContext {
    handle: Handle,
    pub(crate) queue: Arc<MessageQueue>,
    handler: Mutex<Box<dyn Service>>,
    /// Accumulated handler CPU time in nanoseconds; zero-cost (never
    /// written) unless `profile` is enabled.
    cpu_cost_accumulator: AtomicU64,
    endless_flag: AtomicBool,
    /// Set once `retire` has been called or a `system.exit` message was
    /// processed; the context is torn down once the queue next drains.
    retiring: AtomicBool,
    /// Messages a handler queued via [`ServiceContext::send`] during its
    /// current `receive` call. The scheduler drains this right after
    /// dispatch returns and routes each one through `Scheduler::send`,
    /// giving handlers a way to originate sends without holding a
    /// reference to the scheduler itself.
    outbox: Mutex<Vec<Message>>,
}

impl ServiceContext {
    pub fn new(handle: Handle, handler: Box<dyn Service>) -> Arc<Self> {
        Arc::new(ServiceContext {
            handle,
            queue: MessageQueue::create(handle),
            handler: Mutex::new(handler),
            cpu_cost_accumulator: AtomicU64::new(0),
            endless_flag: AtomicBool::new(false),
            retiring: AtomicBool::new(false),
            outbox: Mutex::new(Vec::new()),
        })
    }

    /// Queue a message to be sent once the current `receive` call returns.
    /// Available to handlers that need to originate sends (replies,
    /// forwarded frames) without holding their own scheduler reference.
    pub fn send(&self, msg: Message) {
        self.outbox.lock().push(msg);
    }

    pub(crate) fn take_outbox(&self) -> Vec<Message> {
        std::mem::take(&mut self.outbox.lock())
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    pub fn is_retiring(&self) -> bool {
        self.retiring.load(Ordering::Acquire)
    }

    pub fn mark_retiring(&self) {
        self.retiring.store(true, Ordering::Release);
    }

    pub fn endless_flag(&self) -> bool {
        self.endless_flag.load(Ordering::Relaxed)
    }

    pub fn set_endless_flag(&self) {
        self.endless_flag.store(true, Ordering::Relaxed);
    }

    pub fn add_cpu_cost(&self, nanos: u64) {
        self.cpu_cost_accumulator.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn cpu_cost_nanos(&self) -> u64 {
        self.cpu_cost_accumulator.load(Ordering::Relaxed)
    }

    /// Invoke the handler. Holds the handler's own lock only for the
    /// duration of this call — the single-consumer discipline on the
    /// queue already guarantees only one worker ever reaches here at a
    /// time for a given context, so this lock never contends in
    /// practice; it exists so `ServiceContext` can be `Sync`.
    pub fn dispatch(
        &self,
        type_tag: TypeTag,
        session: u32,
        source: Handle,
        payload: Option<Payload>,
    ) -> Flow {
        self.handler.lock().receive(self, type_tag, session, source, payload)
    }

    pub fn release(&self) {
        self.handler.lock().release(self);
    }
}
