// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-service message queue (a growable ring buffer) and the process-wide
//! global FIFO of queues that have pending work.
//!
//! Algorithmically grounded on the push/pop/expand/mark_release discipline
//! of the Skynet-derived message queue this spec distills; translated from
//! spin locks to `parking_lot::Mutex`, which is held only for O(1) work in
//! every method here, matching the original's lock discipline.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::handle::Handle;
use crate::message::Message;

const DEFAULT_QUEUE_SIZE: usize = 64;
const OVERLOAD_THRESHOLD_DEFAULT: usize = 1024;

struct RingBuffer {
    buf: Vec<Option<Message>>,
    head: usize,
    tail: usize,
    /// Number of occupied slots. Tracked separately from `head`/`tail`
    /// because a full ring has `head == tail`, same as an empty one.
    len: usize,
}

impl RingBuffer {
    fn with_capacity(cap: usize) -> Self {
        let mut buf = Vec::with_capacity(cap);
        buf.resize_with(cap, || None);
        RingBuffer {
            buf,
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn push(&mut self, msg: Message) {
        if self.len == self.capacity() {
            self.grow();
        }
        self.buf[self.tail] = Some(msg);
        self.tail = (self.tail + 1) % self.capacity();
        self.len += 1;
    }

    fn pop(&mut self) -> Option<Message> {
        if self.is_empty() {
            return None;
        }
        let msg = self.buf[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        msg
    }

    /// Doubles capacity, copying elements in logical order starting at
    /// `head`. The ring never shrinks (an Open Question in the source
    /// spec, resolved to match the C implementation, which never does).
    fn grow(&mut self) {
        let old_cap = self.capacity();
        let new_cap = old_cap * 2;
        let mut new_buf = Vec::with_capacity(new_cap);
        for i in 0..old_cap {
            new_buf.push(self.buf[(self.head + i) % old_cap].take());
        }
        new_buf.resize_with(new_cap, || None);
        self.buf = new_buf;
        self.head = 0;
        self.tail = old_cap;
    }
}

struct QueueState {
    ring: RingBuffer,
    in_global: bool,
    release: bool,
    overload: Option<usize>,
    overload_threshold: usize,
}

/// A single service's private FIFO of pending messages.
///
/// `in_global` is true exactly when the queue is present in the global
/// FIFO, or is currently owned by a worker draining it — the single-
/// consumer discipline the rest of the runtime relies on. [`Self::create`]
/// sets it `true` up front specifically so `push` will *not* re-inject the
/// queue into the global FIFO before the owning service's init completes;
/// [`Self::activate`] is the one call that actually splices it in.
pub struct MessageQueue {
    handle: Handle,
    state: Mutex<QueueState>,
}

impl MessageQueue {
    /// Allocate a queue with the default initial capacity. The queue is
    /// marked `in_global` so it is not auto-scheduled until
    /// [`Self::activate`] is called by the service's bootstrap code.
    pub fn create(handle: Handle) -> Arc<Self> {
        Arc::new(MessageQueue {
            handle,
            state: Mutex::new(QueueState {
                ring: RingBuffer::with_capacity(DEFAULT_QUEUE_SIZE),
                in_global: true,
                release: false,
                overload: None,
                overload_threshold: OVERLOAD_THRESHOLD_DEFAULT,
            }),
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Push a message. Returns `true` if this call transitioned the queue
    /// from inactive to active — the caller must then push `self` onto
    /// the [`GlobalQueue`] tail. Returns `false` if the queue was already
    /// active (already queued, or being drained by a worker).
    pub fn push(self: &Arc<Self>, msg: Message) -> bool {
        let mut state = self.state.lock();
        state.ring.push(msg);
        if !state.in_global {
            state.in_global = true;
            true
        } else {
            false
        }
    }

    /// First activation after `create`: unconditionally splice into the
    /// global FIFO, relying on `in_global` already being `true`.
    pub fn activate(self: &Arc<Self>, global: &GlobalQueue) {
        global.push(Arc::clone(self));
    }

    /// Pop the next message. Returns `None` if the queue is empty, in
    /// which case `in_global` is cleared — the caller (a worker finishing
    /// a batch) must not push the queue back onto the global FIFO.
    pub fn pop(&self) -> Option<Message> {
        let mut state = self.state.lock();
        let msg = state.ring.pop();
        if state.ring.is_empty() {
            state.in_global = false;
            state.overload_threshold = OVERLOAD_THRESHOLD_DEFAULT;
        } else {
            let len = state.ring.len;
            if len > state.overload_threshold {
                state.overload = Some(len);
                state.overload_threshold *= 2;
            }
        }
        msg
    }

    /// Mark the queue for release once drained. Ensures the queue is (or
    /// will be) in the global FIFO so a worker eventually drains and frees
    /// it; returns `true` if the caller must push it onto the
    /// [`GlobalQueue`] to make that happen.
    pub fn mark_release(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock();
        state.release = true;
        if !state.in_global {
            state.in_global = true;
            true
        } else {
            false
        }
    }

    pub fn is_marked_for_release(&self) -> bool {
        self.state.lock().release
    }

    pub fn len(&self) -> usize {
        self.state.lock().ring.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read and clear the current overload observation, if any. Called
    /// periodically by the watchdog.
    pub fn take_overload(&self) -> Option<usize> {
        self.state.lock().overload.take()
    }

    /// Drain every remaining message through `drop_cb`, used when a
    /// release-marked queue is popped empty by a worker for the last
    /// time. `drop_cb` is responsible for synthesizing error replies to
    /// senders with non-zero sessions (session 0 is dropped silently, per
    /// the source this spec distills).
    pub fn drain_for_release(&self, mut drop_cb: impl FnMut(Message)) {
        let mut state = self.state.lock();
        while let Some(msg) = state.ring.pop() {
            drop_cb(msg);
        }
        state.in_global = false;
    }
}

/// The process-wide FIFO of queues that have pending messages. Modeled as
/// a `VecDeque` behind a single mutex — the idiomatic equivalent of the
/// singly linked list with head/tail pointers under a spin lock that the
/// spec describes; held only for O(1) splice work in every method.
pub struct GlobalQueue {
    inner: Mutex<VecDeque<Arc<MessageQueue>>>,
}

impl GlobalQueue {
    pub fn new() -> Self {
        GlobalQueue {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, q: Arc<MessageQueue>) {
        self.inner.lock().push_back(q);
    }

    pub fn pop(&self) -> Option<Arc<MessageQueue>> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GlobalQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;
    use crate::message::{Message, TypeTag};

    fn msg(session: u32) -> Message {
        Message::new(Handle::NONE, Handle::new(0, 1), session, TypeTag::Text, None)
    }

    #[test]
    fn push_before_activate_does_not_request_global_push() {
        let q = MessageQueue::create(Handle::new(0, 1));
        assert!(!q.push(msg(1)));
    }

    #[test]
    fn pop_then_push_round_trips_in_order() {
        let q = MessageQueue::create(Handle::new(0, 1));
        q.push(msg(1));
        q.push(msg(2));
        assert_eq!(q.pop().unwrap().session, 1);
        assert_eq!(q.pop().unwrap().session, 2);
        assert!(q.pop().is_none());
    }

    #[test]
    fn empty_pop_clears_in_global() {
        let q = MessageQueue::create(Handle::new(0, 1));
        let global = GlobalQueue::new();
        q.activate(&global);
        global.pop();
        q.push(msg(1));
        q.pop();
        assert!(q.pop().is_none());
        assert!(q.push(msg(2)));
    }

    #[test]
    fn grows_past_default_capacity_without_losing_order() {
        let q = MessageQueue::create(Handle::new(0, 1));
        for i in 0..200u32 {
            q.push(msg(i));
        }
        for i in 0..200u32 {
            assert_eq!(q.pop().unwrap().session, i);
        }
    }

    #[test]
    fn overload_is_observed_once_threshold_exceeded() {
        let q = MessageQueue::create(Handle::new(0, 1));
        for i in 0..2000u32 {
            q.push(msg(i));
        }
        let mut saw_overload = false;
        for _ in 0..2000 {
            q.pop();
            if q.take_overload().is_some() {
                saw_overload = true;
            }
        }
        assert!(saw_overload);
    }

    #[test]
    fn overload_threshold_resets_to_default_after_full_drain() {
        let q = MessageQueue::create(Handle::new(0, 1));
        for i in 0..2000u32 {
            q.push(msg(i));
        }
        for _ in 0..2000 {
            q.pop();
        }
        for i in 0..1025u32 {
            q.push(msg(i));
        }
        let mut saw_overload = false;
        for _ in 0..1025 {
            q.pop();
            if q.take_overload().is_some() {
                saw_overload = true;
            }
        }
        assert!(saw_overload);
    }

    #[test]
    fn global_queue_is_fifo() {
        let global = GlobalQueue::new();
        let a = MessageQueue::create(Handle::new(0, 1));
        let b = MessageQueue::create(Handle::new(0, 2));
        global.push(Arc::clone(&a));
        global.push(Arc::clone(&b));
        assert_eq!(global.pop().unwrap().handle(), a.handle());
        assert_eq!(global.pop().unwrap().handle(), b.handle());
        assert!(global.pop().is_none());
    }

    #[test]
    fn mark_release_drains_with_drop_callback() {
        let q = MessageQueue::create(Handle::new(0, 1));
        q.push(msg(1));
        q.push(msg(0));
        assert!(!q.mark_release());
        let mut replied = Vec::new();
        q.drain_for_release(|m| {
            if m.session != 0 {
                replied.push(m.session);
            }
        });
        assert_eq!(replied, vec![1]);
        assert!(q.is_empty());
    }
}
