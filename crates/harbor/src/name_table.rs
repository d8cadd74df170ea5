// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The harbor's name → handle table, with a per-name pending-message
//! queue for messages sent to a name before it resolves.
//!
//! Grounded on `service_harbor.c`'s `hashmap`/`keyvalue`/`update_name`:
//! single-writer (only the harbor service itself ever mutates this, from
//! its own dispatch thread), so a plain `HashMap` suffices — no name
//! removal is supported, matching the source's "Don't support erase name
//! yet" comment.

use std::collections::{HashMap, VecDeque};

use hub_core::{Handle, Message};

struct NameEntry {
    handle: Option<Handle>,
    pending: VecDeque<Message>,
}

/// Name table owned exclusively by the harbor service.
pub struct NameTable {
    entries: HashMap<String, NameEntry>,
}

impl NameTable {
    pub fn new() -> Self {
        NameTable {
            entries: HashMap::new(),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<Handle> {
        self.entries.get(name).and_then(|e| e.handle)
    }

    /// Queue `msg` for delivery once `name` resolves. Returns `true` if
    /// this is the first time `name` has been seen — the caller should
    /// issue a `Q <name>` resolution request exactly once per unresolved
    /// name rather than on every enqueue.
    pub fn enqueue_pending(&mut self, name: &str, msg: Message) -> bool {
        let is_new = !self.entries.contains_key(name);
        let entry = self.entries.entry(name.to_string()).or_insert_with(|| NameEntry {
            handle: None,
            pending: VecDeque::new(),
        });
        entry.pending.push_back(msg);
        is_new
    }

    /// Register `name -> handle`, returning every message that was
    /// waiting on this name so the caller can route them now.
    pub fn register(&mut self, name: &str, handle: Handle) -> Vec<Message> {
        let entry = self.entries.entry(name.to_string()).or_insert_with(|| NameEntry {
            handle: None,
            pending: VecDeque::new(),
        });
        entry.handle = Some(handle);
        entry.pending.drain(..).collect()
    }
}

impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::TypeTag;

    fn msg() -> Message {
        Message::new(Handle::NONE, Handle::NONE, 1, TypeTag::Text, None)
    }

    #[test]
    fn unresolved_name_returns_none() {
        let table = NameTable::new();
        assert_eq!(table.resolve("svc"), None);
    }

    #[test]
    fn first_enqueue_reports_new_name() {
        let mut table = NameTable::new();
        assert!(table.enqueue_pending("svc", msg()));
        assert!(!table.enqueue_pending("svc", msg()));
    }

    #[test]
    fn register_flushes_pending_messages_in_order() {
        let mut table = NameTable::new();
        table.enqueue_pending("svc", msg());
        table.enqueue_pending("svc", msg());
        let handle = Handle::new(2, 5);
        let flushed = table.register("svc", handle);
        assert_eq!(flushed.len(), 2);
        assert_eq!(table.resolve("svc"), Some(handle));
    }
}
