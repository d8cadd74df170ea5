// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SIGHUP/SIGPIPE handling, per `spec.md` §6. `signal-hook`'s safe
//! iterator API stands in for the `sigaction`-based install `spec.md`
//! describes: the workspace forbids `unsafe_code` outright, and
//! `nix::sys::signal::sigaction` is an `unsafe fn`, so it is not a fit
//! here even though it is the teacher's usual signal crate. Grounded on
//! `signal-hook`'s use in `r3bl-org-r3bl-open-core/tui` for the same
//! kind of signal-driven thread wakeup.

use std::sync::Arc;
use std::thread::JoinHandle;

use hub_core::{Handle, Message, Payload, TypeTag};
use hub_runtime::Scheduler;
use signal_hook::consts::{SIGHUP, SIGINT, SIGPIPE, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::info;

/// Spawns the thread that blocks in `signal_hook`'s iterator. SIGHUP
/// forwards a reload-log message to `logservice`; SIGINT/SIGTERM request
/// scheduler shutdown and stop the loop; SIGPIPE is registered only so a
/// broken harbor socket write raises `EPIPE` instead of killing the
/// process, and is otherwise ignored.
#[allow(clippy::expect_used)]
pub fn install(scheduler: Arc<Scheduler>, logservice: Handle) -> std::io::Result<JoinHandle<()>> {
    let mut signals = Signals::new([SIGHUP, SIGINT, SIGTERM, SIGPIPE])?;
    Ok(std::thread::Builder::new()
        .name("hub-signals".to_string())
        .spawn(move || {
            for signal in &mut signals {
                match signal {
                    SIGHUP => {
                        info!("SIGHUP received, reloading log");
                        scheduler.send(Message::new(
                            Handle::NONE,
                            logservice,
                            0,
                            TypeTag::System,
                            Some(Payload::owned(hub_runtime::logger::RELOAD_LOG.to_vec())),
                        ));
                    }
                    SIGINT | SIGTERM => {
                        info!(signal, "shutdown signal received");
                        scheduler.request_quit();
                        break;
                    }
                    _ => {}
                }
            }
        })
        .expect("spawning the signal thread should not fail"))
}
