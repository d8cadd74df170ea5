// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide startup and shutdown ordering: spins up the worker pool,
//! the timer thread, and the watchdog thread; tears them down in reverse
//! order on shutdown.
//!
//! The PID-file locking pattern (lock before truncate, so a second
//! instance never clobbers a running daemon's file) is grounded on
//! `oj-daemon::lifecycle::startup`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use fs2::FileExt;
use hub_core::{Config, Message, SystemClock, TimingWheel};
use thiserror::Error;
use tracing::{info, warn};

use crate::registry::Registry;
use crate::scheduler::{default_weights, Scheduler};
use crate::watchdog::{CheckResult, MonitorSlot, Watchdog};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("daemon already running (pid file locked): {0}")]
    LockFailed(PathBuf),
    #[error("failed to write pid file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Holds the PID file open (and locked) for the process lifetime; dropping
/// it releases the lock.
struct PidLock {
    _file: File,
    path: PathBuf,
}

fn acquire_pid_lock(path: &Path) -> Result<PidLock, LifecycleError> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .map_err(|source| LifecycleError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })?;
    // Lock before truncating: if another instance holds the lock, this
    // call fails and we must not clobber its pid file.
    file.try_lock_exclusive()
        .map_err(|_| LifecycleError::LockFailed(path.to_path_buf()))?;
    let mut file = file;
    file.set_len(0).map_err(|source| LifecycleError::WriteFailed {
        path: path.to_path_buf(),
        source,
    })?;
    write!(file, "{}", std::process::id()).map_err(|source| LifecycleError::WriteFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(PidLock {
        _file: file,
        path: path.to_path_buf(),
    })
}

impl Drop for PidLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

const TIMER_TICK: Duration = Duration::from_micros(2500);
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);
const WATCHDOG_SLICE: Duration = Duration::from_secs(1);

/// A fully wired, running instance of the actor runtime: the scheduler,
/// its worker threads, the timer thread, and the watchdog thread.
pub struct Node {
    pub scheduler: Arc<Scheduler>,
    pid_lock: Option<PidLock>,
    shutting_down: Arc<AtomicBool>,
    worker_handles: Vec<JoinHandle<()>>,
    timer_handle: Option<JoinHandle<()>>,
    watchdog_handle: Option<JoinHandle<()>>,
}

impl Node {
    /// Start the runtime: acquire the PID file (if `config.daemon` is
    /// set), build the registry and scheduler, and spawn the worker,
    /// timer, and watchdog threads. No message may be sent before this
    /// returns.
    pub fn start(config: &Config) -> Result<Self, LifecycleError> {
        let pid_lock = match &config.daemon {
            Some(path) => Some(acquire_pid_lock(path)?),
            None => None,
        };

        let registry = Arc::new(Registry::new(config.harbor));
        let weights = default_weights(config.threads);
        let scheduler = Scheduler::with_profile(registry, weights, config.harbor, config.profile);

        let monitors: Vec<Arc<MonitorSlot>> =
            (0..config.threads).map(|_| MonitorSlot::new()).collect();
        let shutting_down = Arc::new(AtomicBool::new(false));

        let mut worker_handles = Vec::with_capacity(config.threads);
        for (idx, monitor) in monitors.iter().cloned().enumerate() {
            let scheduler = Arc::clone(&scheduler);
            #[allow(clippy::expect_used)]
            let handle = std::thread::Builder::new()
                .name(format!("hub-worker-{idx}"))
                .spawn(move || {
                    scheduler.run_worker(idx, &monitor);
                })
                .expect("spawning a worker thread should not fail");
            worker_handles.push(handle);
        }

        let timer_handle = {
            let scheduler = Arc::clone(&scheduler);
            let shutting_down = Arc::clone(&shutting_down);
            #[allow(clippy::expect_used)]
            let handle = std::thread::Builder::new()
                .name("hub-timer".to_string())
                .spawn(move || run_timer_thread(scheduler, shutting_down))
                .expect("spawning the timer thread should not fail");
            Some(handle)
        };

        let watchdog_handle = {
            let scheduler = Arc::clone(&scheduler);
            let shutting_down = Arc::clone(&shutting_down);
            #[allow(clippy::expect_used)]
            let handle = std::thread::Builder::new()
                .name("hub-watchdog".to_string())
                .spawn(move || run_watchdog_thread(scheduler, monitors, shutting_down))
                .expect("spawning the watchdog thread should not fail");
            Some(handle)
        };

        info!(threads = config.threads, harbor = config.harbor, "runtime started");

        Ok(Node {
            scheduler,
            pid_lock,
            shutting_down,
            worker_handles,
            timer_handle,
            watchdog_handle,
        })
    }

    /// Shut down in reverse init order: stop producing new work, signal
    /// threads to quit, then join everything. No message may be sent
    /// during or after this call — it can reenter a torn-down subsystem.
    pub fn shutdown(mut self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.scheduler.request_quit();
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.timer_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.watchdog_handle.take() {
            let _ = handle.join();
        }
        info!("runtime stopped");
        drop(self.pid_lock.take());
    }
}

fn run_timer_thread(scheduler: Arc<Scheduler>, shutting_down: Arc<AtomicBool>) {
    let clock = SystemClock;
    let wheel = TimingWheel::new(clock);
    while !shutting_down.load(Ordering::SeqCst) {
        std::thread::sleep(TIMER_TICK);
        for fired in wheel.advance() {
            scheduler.send(Message::timeout_response(fired.handle, fired.session));
        }
        if scheduler.is_quitting() {
            break;
        }
    }
}

fn run_watchdog_thread(
    scheduler: Arc<Scheduler>,
    monitors: Vec<Arc<MonitorSlot>>,
    shutting_down: Arc<AtomicBool>,
) {
    let watchdog = Watchdog::new(monitors.len());
    let mut elapsed = Duration::ZERO;
    while !shutting_down.load(Ordering::SeqCst) {
        std::thread::sleep(WATCHDOG_SLICE);
        elapsed += WATCHDOG_SLICE;
        if scheduler.is_quitting() {
            break;
        }
        if elapsed < WATCHDOG_INTERVAL {
            continue;
        }
        elapsed = Duration::ZERO;
        for (idx, monitor) in monitors.iter().enumerate() {
            if let CheckResult::Stuck { source, destination } = watchdog.check(idx, monitor) {
                if let Some(ctx) = scheduler.registry().grab(destination) {
                    ctx.set_endless_flag();
                }
                warn!(%source, %destination, "endless loop detected");
            }
        }
    }
}
