// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup configuration: the keys an implementation must accept, loaded
//! from a TOML file via `serde`, with defaults matching the runtime's
//! baseline behavior when a key is omitted.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

fn default_threads() -> usize {
    8
}

fn default_logservice() -> String {
    "logger".to_string()
}

/// Process-wide startup configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker thread count.
    pub threads: usize,
    /// Local node (harbor) id in `[0, 255]`; `0` disables remote links.
    pub harbor: u8,
    /// Command line launched as the first service, if any.
    pub bootstrap: Option<String>,
    /// Log file path; `None` means stdout.
    pub logger: Option<PathBuf>,
    /// Name of the logger service.
    pub logservice: String,
    /// Enables per-handler CPU time accounting.
    pub profile: bool,
    /// PID file path; presence enables daemonization.
    pub daemon: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            threads: default_threads(),
            harbor: 0,
            bootstrap: None,
            logger: None,
            logservice: default_logservice(),
            profile: false,
            daemon: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(text)?;
        Ok(cfg)
    }

    pub fn harbor_enabled(&self) -> bool {
        self.harbor != 0
    }
}
