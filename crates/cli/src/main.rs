// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `hubd`: the process entry point. Loads `Config`, wires up the worker
//! pool/timer/watchdog via `hub_runtime::Node`, optionally starts the
//! harbor, installs signal handling, and blocks until told to shut down.
//!
//! Grounded on `oj-daemon::lifecycle::startup`'s staged bring-up (lock,
//! build state, spawn background work, log "started") and `oj-cli`'s use
//! of `clap` for argument parsing.

mod cli;
mod signals;

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use hub_core::Config;
use hub_runtime::{LoggerService, Node};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] hub_core::ConfigError),
    #[error(transparent)]
    Lifecycle(#[from] hub_runtime::LifecycleError),
    #[error("failed to install signal handlers: {0}")]
    Signals(#[from] std::io::Error),
}

fn main() -> Result<(), AppError> {
    let args = cli::Args::parse();
    let mut config = Config::load(&args.config)?;
    cli::apply_overrides(&mut config, &args);

    // The non-blocking file writer guard must outlive the subscriber; keep
    // it bound in `main` for the whole process lifetime.
    let _log_guard = init_tracing(&config);

    let node = Node::start(&config)?;

    let logger_ctx = node.scheduler.register(Box::new(LoggerService::default()));
    node.scheduler
        .registry()
        .name_handle(logger_ctx.handle(), &config.logservice)
        .ok();

    let harbor_node = if config.harbor_enabled() {
        Some(hub_harbor::start(
            &node.scheduler,
            config.harbor,
            HashMap::new(),
            None,
        ))
    } else {
        None
    };

    if let Some(bootstrap) = &config.bootstrap {
        warn!(%bootstrap, "bootstrap service launching is out of scope; ignoring");
    }

    let _signal_thread = signals::install(Arc::clone(&node.scheduler), logger_ctx.handle())?;

    // The signal thread requests shutdown via `Scheduler::request_quit`;
    // poll for it rather than joining, since the scheduler can also quit
    // on its own (every registered service retired) with no signal ever
    // arriving.
    while !node.scheduler.is_quitting() {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    if let Some(harbor_node) = harbor_node {
        harbor_node.shutdown();
    }
    node.shutdown();
    Ok(())
}

fn init_tracing(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.logger {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "hub.log".to_string());
            let appender = tracing_appender::rolling::never(
                dir.unwrap_or_else(|| std::path::Path::new(".")),
                file_name,
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            info!(path = %path.display(), "logging to file");
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
            None
        }
    }
}
