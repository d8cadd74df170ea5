// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error kinds, grouped by the subsystem that raises them.
//!
//! Recoverable transport/addressing errors become reply messages at the
//! call site; this enum exists so logging and reply-message construction
//! share one vocabulary. Fatal kinds (`Overflow`, `ResourceExhaustion`) are
//! never propagated as `Result` past the point of detection — the caller
//! logs via `tracing::error!` and exits the process.

use thiserror::Error;

/// A handle that was looked up but no longer (or never) identifies a live
/// service.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("service {0:#010x} not found")]
pub struct ServiceNotFound(pub u32);

/// Errors raised while registering or looking up services and names.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The local-id table is full and cannot grow further (u32 local-id
    /// space exhausted). Fatal: startup aborts.
    #[error("handle table overflow")]
    Overflow,
    /// A `name_handle` call tried to register a name already bound to a
    /// different handle.
    #[error("name already registered")]
    NameExists,
}

/// Errors raised while the harbor router frames, parses, or routes
/// messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HarborError {
    /// Destination's node link is in the `Down` state.
    #[error("peer {0} unreachable")]
    PeerUnreachable(u8),
    /// Inbound frame length prefix's high byte was non-zero, or the
    /// decoded length exceeds the 16 MiB cap.
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(u32),
    /// The peer's handshake byte did not match the expected node id.
    #[error("handshake mismatch: expected {expected}, got {actual}")]
    HandshakeMismatch { expected: u8, actual: u8 },
    /// A frame arrived, or a command was issued, for a peer slot that is
    /// not in the state required for that operation.
    #[error("peer {0} in unexpected state")]
    UnexpectedState(u8),
}

/// Fatal errors: the process cannot continue in a consistent state after
/// one of these, and the caller is expected to log and abort rather than
/// unwind.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FatalError {
    #[error("handle table overflow")]
    Overflow,
    #[error("resource exhausted")]
    ResourceExhaustion,
}

/// Errors from loading or validating the startup `Config`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
