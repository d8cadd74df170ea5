// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hierarchical timing wheel: a `near[256]` tier for the next 256 ticks
//! plus four `level[64]` tiers of progressively coarser granularity,
//! cascading nodes down as higher bits of the tick counter roll over.
//!
//! Grounded on `skynet_timer.c`'s `add_node`/`move_list`/`timer_execute`
//! algorithm; a tick is 1/100 second. The wheel lock (`parking_lot::Mutex`)
//! is released before dispatching fired nodes, matching the source's
//! "don't stall inserters while delivering" discipline.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::handle::Handle;

const TIME_NEAR_SHIFT: u32 = 8;
const TIME_NEAR: usize = 1 << TIME_NEAR_SHIFT; // 256
const TIME_NEAR_MASK: u32 = (TIME_NEAR as u32) - 1;
const TIME_LEVEL_SHIFT: u32 = 6;
const TIME_LEVEL: usize = 1 << TIME_LEVEL_SHIFT; // 64
const TIME_LEVEL_MASK: u32 = (TIME_LEVEL as u32) - 1;
const LEVELS: usize = 4;

/// A tick is 1/100 second.
pub const TICK: Duration = Duration::from_millis(10);

#[derive(Clone)]
struct TimerNode {
    expire: u32,
    handle: Handle,
    session: u32,
}

/// An expired node, ready to become a response message.
pub struct FiredTimer {
    pub handle: Handle,
    pub session: u32,
}

struct WheelState {
    near: Vec<VecDeque<TimerNode>>,
    level: Vec<Vec<VecDeque<TimerNode>>>,
    /// Monotonic tick counter; wraps at `u32::MAX`.
    time: u32,
}

impl WheelState {
    fn new() -> Self {
        WheelState {
            near: (0..TIME_NEAR).map(|_| VecDeque::new()).collect(),
            level: (0..LEVELS)
                .map(|_| (0..TIME_LEVEL).map(|_| VecDeque::new()).collect())
                .collect(),
            time: 0,
        }
    }

    /// Place `node` into the bucket matching its `expire` relative to the
    /// wheel's current `time`, per the bit-window comparison in
    /// `skynet_timer.c::add_node`.
    fn add_node(&mut self, node: TimerNode) {
        let current = self.time;
        let expire = node.expire;
        if (expire | TIME_NEAR_MASK) == (current | TIME_NEAR_MASK) {
            self.near[(expire & TIME_NEAR_MASK) as usize].push_back(node);
            return;
        }
        for i in 0..LEVELS {
            if i == LEVELS - 1 {
                let idx = ((expire >> (TIME_NEAR_SHIFT + i as u32 * TIME_LEVEL_SHIFT))
                    & TIME_LEVEL_MASK) as usize;
                self.level[i][idx].push_back(node);
                return;
            }
            let shift = TIME_NEAR_SHIFT + (i as u32 + 1) * TIME_LEVEL_SHIFT;
            let mask = (1u32 << shift) - 1;
            if (expire | mask) == (current | mask) {
                let idx = ((expire >> (TIME_NEAR_SHIFT + i as u32 * TIME_LEVEL_SHIFT))
                    & TIME_LEVEL_MASK) as usize;
                self.level[i][idx].push_back(node);
                return;
            }
        }
    }

    /// Re-insert every node from `level[level_idx][bucket_idx]`; they will
    /// now land in a finer `level` tier or in `near`.
    fn cascade(&mut self, level_idx: usize, bucket_idx: usize) {
        let nodes: Vec<TimerNode> = self.level[level_idx][bucket_idx].drain(..).collect();
        for node in nodes {
            self.add_node(node);
        }
    }

    /// Advance `time` by one tick, cascading any rolled-over level bucket.
    /// Mirrors `skynet_timer.c::timer_shift` exactly: `mask` starts at
    /// `TIME_NEAR` (not `TIME_NEAR_MASK`) and widens by `TIME_LEVEL_SHIFT`
    /// bits per iteration while `time` walks down the already-shifted tick
    /// count, rather than recomputing a widening mask against the raw tick
    /// each time.
    fn shift(&mut self) {
        self.time = self.time.wrapping_add(1);
        let ct = self.time;
        if ct == 0 {
            self.cascade(LEVELS - 1, 0);
            return;
        }
        let mut mask: u32 = TIME_NEAR as u32;
        let mut time = ct >> TIME_NEAR_SHIFT;
        let mut i = 0usize;
        while ct & (mask - 1) == 0 {
            let idx = (time & TIME_LEVEL_MASK) as usize;
            if idx != 0 {
                self.cascade(i, idx);
                break;
            }
            mask <<= TIME_LEVEL_SHIFT;
            time >>= TIME_LEVEL_SHIFT;
            i += 1;
            if i >= LEVELS {
                break;
            }
        }
    }

    fn drain_near_at_current(&mut self) -> Vec<TimerNode> {
        let idx = (self.time & TIME_NEAR_MASK) as usize;
        self.near[idx].drain(..).collect()
    }
}

/// The hierarchical timing wheel plus the wall-clock bookkeeping that
/// turns elapsed real time into whole-tick advances.
pub struct TimingWheel<C: Clock> {
    clock: C,
    state: Mutex<WheelState>,
    /// The instant the wheel was created; used only to compute elapsed
    /// ticks, never exposed.
    start: std::time::Instant,
    /// The last sampled tick count, for detecting backwards clock jumps.
    last_ticks: Mutex<u64>,
}

impl<C: Clock> TimingWheel<C> {
    pub fn new(clock: C) -> Self {
        let start = clock.now();
        TimingWheel {
            clock,
            state: Mutex::new(WheelState::new()),
            start,
            last_ticks: Mutex::new(0),
        }
    }

    fn elapsed_ticks(&self) -> u64 {
        let elapsed = self.clock.now().saturating_duration_since(self.start);
        elapsed.as_millis() as u64 / 10
    }

    /// `ticks <= 0` is handled by the caller (push a response message
    /// directly); this only ever receives `ticks > 0`.
    pub fn schedule(&self, handle: Handle, ticks: u32, session: u32) {
        let mut state = self.state.lock();
        let expire = state.time.wrapping_add(ticks);
        state.add_node(TimerNode {
            expire,
            handle,
            session,
        });
    }

    /// Advance the wheel by whatever whole ticks have elapsed since the
    /// last call, collecting every node that fired along the way. Returns
    /// `Err` (logged by the caller, not fatal) if the clock moved
    /// backwards; in that case ticks are resynced without firing.
    pub fn advance(&self) -> Vec<FiredTimer> {
        let now_ticks = self.elapsed_ticks();
        let mut last = self.last_ticks.lock();
        if now_ticks < *last {
            // Clock went backwards (e.g. NTP step); resync without firing.
            *last = now_ticks;
            return Vec::new();
        }
        let elapsed = now_ticks - *last;
        *last = now_ticks;
        drop(last);

        let mut fired = Vec::new();
        for _ in 0..elapsed {
            fired.extend(self.execute());
            let mut state = self.state.lock();
            state.shift();
            drop(state);
            fired.extend(self.execute());
        }
        fired
    }

    fn execute(&self) -> Vec<FiredTimer> {
        let mut state = self.state.lock();
        let nodes = state.drain_near_at_current();
        drop(state);
        nodes
            .into_iter()
            .map(|n| FiredTimer {
                handle: n.handle,
                session: n.session,
            })
            .collect()
    }

    pub fn current_tick(&self) -> u32 {
        self.state.lock().time
    }
}
