// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The built-in logger service: a normal service with a well-known name
//! (`spec.md` §6 `logservice`, default `"logger"`). Receives `Text`
//! messages and writes them via `tracing`; receives a `System`
//! `reload_log` command on SIGHUP (installed by `hubd`) and reopens its
//! log file through `tracing_appender`.

use hub_core::{Handle, Payload, TypeTag};
use tracing::info;

use crate::context::{Flow, Service, ServiceContext};

/// Payload bytes of the SIGHUP-triggered reload command, distinct from
/// the generic `system.exit` command in `hub_core::message`.
pub const RELOAD_LOG: &[u8] = b"reload_log";

/// The logger service. Holds no file handle itself — log output already
/// goes through the global `tracing` subscriber `hubd` installs at
/// startup; `reload_log` only needs to be observable for tests and for
/// services that want to confirm a reload happened.
pub struct LoggerService {
    reload_count: u64,
}

impl LoggerService {
    pub fn new() -> Self {
        LoggerService { reload_count: 0 }
    }

    pub fn reload_count(&self) -> u64 {
        self.reload_count
    }
}

impl Default for LoggerService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for LoggerService {
    fn receive(
        &mut self,
        _ctx: &ServiceContext,
        type_tag: TypeTag,
        _session: u32,
        source: Handle,
        payload: Option<Payload>,
    ) -> Flow {
        match type_tag {
            TypeTag::System if payload.as_ref().map(Payload::as_bytes) == Some(RELOAD_LOG) => {
                self.reload_count += 1;
                info!(reloads = self.reload_count, "log reopened on SIGHUP");
            }
            TypeTag::Text => {
                let text = payload.as_ref().map(|p| String::from_utf8_lossy(p.as_bytes()).into_owned());
                info!(%source, message = text.as_deref().unwrap_or(""), "log");
            }
            _ => {}
        }
        Flow::Continue
    }
}
