// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-worker liveness monitor: detects a handler that never returns from
//! a single message (a "stuck" or "endless loop" service).
//!
//! Grounded directly on `skynet_monitor.c`: each worker owns a slot
//! recording the `{source, destination}` of the message it is currently
//! dispatching and an atomic version counter bumped on every dispatch; a
//! separate watchdog thread periodically compares the version against the
//! last value it observed. No change between checks means the worker has
//! been stuck in one handler call for the entire interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hub_core::Handle;
use parking_lot::Mutex;

/// One worker's liveness slot. Cheap to update on every dispatch: a
/// relaxed store of the current `(source, destination)` pair followed by
/// an atomic increment, matching the source's `skynet_monitor_trigger`.
pub struct MonitorSlot {
    version: AtomicU64,
    current: Mutex<(Handle, Handle)>,
}

impl MonitorSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(MonitorSlot {
            version: AtomicU64::new(0),
            current: Mutex::new((Handle::NONE, Handle::NONE)),
        })
    }

    /// Record that this worker is about to dispatch `source -> destination`.
    pub fn trigger(&self, source: Handle, destination: Handle) {
        *self.current.lock() = (source, destination);
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> (u64, Handle, Handle) {
        let (source, destination) = *self.current.lock();
        (self.version.load(Ordering::SeqCst), source, destination)
    }
}

impl Default for MonitorSlot {
    fn default() -> Self {
        MonitorSlot {
            version: AtomicU64::new(0),
            current: Mutex::new((Handle::NONE, Handle::NONE)),
        }
    }
}

/// What the watchdog decides after comparing a slot's version against the
/// last value it recorded for that slot.
pub enum CheckResult {
    Alive,
    /// The slot's version has not moved since the last check and a real
    /// destination was recorded — the handler at `destination`, invoked
    /// from `source`, has not returned in at least one check interval.
    Stuck { source: Handle, destination: Handle },
}

/// Tracks the last-observed version per worker and classifies each check.
pub struct Watchdog {
    last_observed: Vec<AtomicU64>,
}

impl Watchdog {
    pub fn new(worker_count: usize) -> Self {
        Watchdog {
            last_observed: (0..worker_count).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Check one worker's slot. On `Stuck`, the caller is expected to set
    /// `endless_flag` on `destination` and log a warning; on `Alive`, the
    /// last-observed version is advanced so the next interval starts
    /// fresh.
    pub fn check(&self, worker_index: usize, slot: &MonitorSlot) -> CheckResult {
        let (version, source, destination) = slot.snapshot();
        let last = &self.last_observed[worker_index];
        let previous = last.load(Ordering::SeqCst);
        if previous == version {
            if destination.is_valid() {
                return CheckResult::Stuck { source, destination };
            }
            return CheckResult::Alive;
        }
        last.store(version, Ordering::SeqCst);
        CheckResult::Alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_version_with_real_destination_is_stuck() {
        let slot = MonitorSlot::new();
        let src = Handle::new(0, 1);
        let dst = Handle::new(0, 2);
        slot.trigger(src, dst);

        let watchdog = Watchdog::new(1);
        // First check just records the baseline version.
        assert!(matches!(watchdog.check(0, &slot), CheckResult::Alive));
        // No further trigger happened: second check sees the same version.
        match watchdog.check(0, &slot) {
            CheckResult::Stuck { source, destination } => {
                assert_eq!(source, src);
                assert_eq!(destination, dst);
            }
            CheckResult::Alive => panic!("expected stuck"),
        }
    }

    #[test]
    fn progressing_version_stays_alive() {
        let slot = MonitorSlot::new();
        let watchdog = Watchdog::new(1);
        slot.trigger(Handle::new(0, 1), Handle::new(0, 2));
        assert!(matches!(watchdog.check(0, &slot), CheckResult::Alive));
        slot.trigger(Handle::new(0, 1), Handle::new(0, 3));
        assert!(matches!(watchdog.check(0, &slot), CheckResult::Alive));
    }

    #[test]
    fn idle_worker_with_no_destination_is_never_stuck() {
        let slot = MonitorSlot::new();
        let watchdog = Watchdog::new(1);
        assert!(matches!(watchdog.check(0, &slot), CheckResult::Alive));
        assert!(matches!(watchdog.check(0, &slot), CheckResult::Alive));
    }
}
