// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The message envelope carried by every queue, the wheel, and the harbor
//! codec: `(source, destination, session, type_tag, payload)`.

use crate::handle::Handle;

/// The kind of a message, carried in the high byte of the wire
/// destination word and as its own field everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    /// Plain application text/bytes.
    Text = 0,
    /// A reply to an earlier request, correlated by `session`.
    Response = 1,
    /// A reply carrying a failure, correlated by `session`.
    Error = 2,
    /// Runtime-internal control (e.g. `system.exit`, log-reload).
    System = 3,
    /// An event translated from the socket poller.
    Socket = 4,
    /// A harbor control command (`N`/`S`/`A`/`D`/`Q`) or framed payload.
    Harbor = 5,
}

/// The well-known payload bytes of a `System`-typed exit command, matching
/// the `system.exit` message named in the dispatch algorithm.
pub const SYSTEM_EXIT: &[u8] = b"exit";

impl TypeTag {
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(TypeTag::Text),
            1 => Some(TypeTag::Response),
            2 => Some(TypeTag::Error),
            3 => Some(TypeTag::System),
            4 => Some(TypeTag::Socket),
            5 => Some(TypeTag::Harbor),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A message payload. Ownership transfers to the destination on enqueue
/// (`Owned`) unless the sender set the "don't copy" flag, in which case
/// the sender retains the backing bytes for the duration of the handler
/// call (`Borrowed`) — the dispatcher never frees a `Borrowed` payload.
#[derive(Debug, Clone)]
pub enum Payload {
    Owned(Box<[u8]>),
    Borrowed(std::sync::Arc<[u8]>),
}

impl Payload {
    pub fn owned(bytes: impl Into<Box<[u8]>>) -> Self {
        Payload::Owned(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Owned(b) => b,
            Payload::Borrowed(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// True if this was enqueued with the "don't copy" flag — the
    /// dispatcher must not treat returning from the handler as the last
    /// use of these bytes.
    pub fn is_borrowed(&self) -> bool {
        matches!(self, Payload::Borrowed(_))
    }
}

/// One unit of work delivered to a service's queue.
#[derive(Debug, Clone)]
pub struct Message {
    pub source: Handle,
    pub destination: Handle,
    /// Correlation id chosen by the sender; 0 means "no reply expected".
    pub session: u32,
    pub type_tag: TypeTag,
    pub payload: Option<Payload>,
}

impl Message {
    pub fn new(
        source: Handle,
        destination: Handle,
        session: u32,
        type_tag: TypeTag,
        payload: Option<Payload>,
    ) -> Self {
        Message {
            source,
            destination,
            session,
            type_tag,
            payload,
        }
    }

    /// Build the `system.exit` command a supervisor sends to ask a
    /// service to retire itself.
    pub fn system_exit(destination: Handle) -> Self {
        Message {
            source: Handle::NONE,
            destination,
            session: 0,
            type_tag: TypeTag::System,
            payload: Some(Payload::owned(SYSTEM_EXIT.to_vec())),
        }
    }

    /// True if this is a `system.exit` command.
    pub fn is_system_exit(&self) -> bool {
        self.type_tag == TypeTag::System
            && self
                .payload
                .as_ref()
                .is_some_and(|p| p.as_bytes() == SYSTEM_EXIT)
    }

    /// Build the zero-payload response a `schedule(..., ticks <= 0, ...)`
    /// call or a fired timer node synthesizes: `source=0`.
    pub fn timeout_response(destination: Handle, session: u32) -> Self {
        Message {
            source: Handle::NONE,
            destination,
            session,
            type_tag: TypeTag::Response,
            payload: None,
        }
    }

    /// Build the error reply a dropped or misrouted message synthesizes
    /// back to its sender, reusing the original session. Callers must
    /// check `session != 0` before sending this — session 0 means no
    /// reply is expected and the message is dropped silently.
    pub fn error_reply(to: Handle, session: u32) -> Self {
        Message {
            source: Handle::NONE,
            destination: to,
            session,
            type_tag: TypeTag::Error,
            payload: None,
        }
    }

    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Payload::len)
    }
}
