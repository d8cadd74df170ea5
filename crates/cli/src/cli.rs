// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command line surface: a config file path plus the handful of
//! overrides `spec.md` §6 allows at the process boundary. Grounded on
//! `oj-cli`'s use of `clap`'s derive API for its own subcommand args.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "hubd",
    version = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH")),
    about = "Actor runtime node"
)]
pub struct Args {
    /// Path to the TOML config file.
    #[arg(long, default_value = "hub.toml")]
    pub config: PathBuf,

    /// Override the configured worker thread count.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Override the configured harbor (node) id; 0 disables remote links.
    #[arg(long)]
    pub harbor: Option<u8>,

    /// Override the configured PID file path, enabling daemonization.
    #[arg(long)]
    pub daemon: Option<PathBuf>,

    /// Enable per-handler CPU time accounting regardless of config.
    #[arg(long)]
    pub profile: bool,
}

/// Applies the command-line overrides on top of a loaded `Config`. A flag
/// left at its default (`None`, or `false` for `--profile`) leaves the
/// corresponding config key untouched.
pub fn apply_overrides(config: &mut hub_core::Config, args: &Args) {
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(harbor) = args.harbor {
        config.harbor = harbor;
    }
    if let Some(daemon) = &args.daemon {
        config.daemon = Some(daemon.clone());
    }
    if args.profile {
        config.profile = true;
    }
}
