// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The handle registry: allocates local ids, maps handles to service
//! contexts, and maintains the global name table.
//!
//! Grounded on `skynet_handle.h`'s API surface (`register`/`retire`/
//! `grab`/`find_name`/`name_handle`). Readers (`grab`) must not exclude
//! each other, so the slot table lives behind a `parking_lot::RwLock`;
//! names are kept in a `BTreeMap`, the ordered-by-construction structure
//! that stands in for the spec's "sorted array, binary search" — lookup
//! and insertion are both logarithmic, and duplicates are rejected the
//! same way a sorted-insert would reject them.

use std::collections::BTreeMap;
use std::sync::Arc;

use hub_core::error::RegistryError;
use hub_core::Handle;
use parking_lot::RwLock;

use crate::context::ServiceContext;

struct Inner {
    /// Slot `i` holds the context whose local id is `i + 1` (local id 0 is
    /// never valid). Retired slots become `None` and their index may be
    /// reused by a later `register`.
    slots: Vec<Option<Arc<ServiceContext>>>,
    names: BTreeMap<String, Handle>,
}

/// Process-wide registry of live services and their names.
pub struct Registry {
    node_id: u8,
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new(node_id: u8) -> Self {
        Registry {
            node_id,
            inner: RwLock::new(Inner {
                slots: Vec::new(),
                names: BTreeMap::new(),
            }),
        }
    }

    /// Allocate a handle and build its context via `build`, which
    /// receives the assigned handle (a context's handle must be known
    /// before its queue and handler are constructed). Grows the slot
    /// table by doubling on overflow; fails with `Overflow` only if the
    /// local-id space (2^24 - 1) is exhausted.
    pub fn register(
        &self,
        build: impl FnOnce(Handle) -> Arc<ServiceContext>,
    ) -> Result<Arc<ServiceContext>, RegistryError> {
        let mut inner = self.inner.write();
        let local_id = Self::allocate_slot(&mut inner.slots)?;
        let handle = Handle::new(self.node_id, local_id);
        let ctx = build(handle);
        inner.slots[(local_id - 1) as usize] = Some(Arc::clone(&ctx));
        Ok(ctx)
    }

    fn allocate_slot(slots: &mut Vec<Option<Arc<ServiceContext>>>) -> Result<u32, RegistryError> {
        if let Some(idx) = slots.iter().position(|s| s.is_none()) {
            return Ok((idx + 1) as u32);
        }
        let old_len = slots.len();
        let new_len = if old_len == 0 { 64 } else { old_len * 2 };
        if new_len as u64 > hub_core::handle::HANDLE_MASK as u64 {
            return Err(RegistryError::Overflow);
        }
        slots.resize_with(new_len, || None);
        Ok((old_len + 1) as u32)
    }

    /// Look up a live context by handle, incrementing its reference count
    /// (an `Arc` clone). The caller drops the returned `Arc` to release.
    pub fn grab(&self, handle: Handle) -> Option<Arc<ServiceContext>> {
        let inner = self.inner.read();
        let idx = handle.local_id().checked_sub(1)? as usize;
        inner.slots.get(idx).and_then(|s| s.clone())
    }

    /// Remove `handle` from the table so future `grab`/`find_name` calls
    /// fail — per the queue-over-queue design, a handle is only truly
    /// "gone" once both its table entry is removed (here) and its private
    /// queue has been drained by a worker. Returns the context so the
    /// caller can mark its queue for release and ensure it is drained;
    /// returns `None` if the handle was not live.
    pub fn retire(&self, handle: Handle) -> Option<Arc<ServiceContext>> {
        let mut inner = self.inner.write();
        let idx = handle.local_id().checked_sub(1)? as usize;
        let slot = inner.slots.get_mut(idx)?;
        let ctx = slot.take()?;
        inner.names.retain(|_, h| *h != handle);
        ctx.mark_retiring();
        Some(ctx)
    }

    /// Register `name` -> `handle`. Rejects a name already bound to a
    /// different handle with `NameExists`; re-registering the same
    /// name/handle pair is a no-op success.
    pub fn name_handle(&self, handle: Handle, name: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        match inner.names.get(name) {
            Some(existing) if *existing != handle => Err(RegistryError::NameExists),
            _ => {
                inner.names.insert(name.to_string(), handle);
                Ok(())
            }
        }
    }

    /// Resolve a registered name to its handle, if any.
    pub fn find_name(&self, name: &str) -> Option<Handle> {
        self.inner.read().names.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Flow, Service, ServiceContext};
    use hub_core::{Payload, TypeTag};

    struct NoopService;
    impl Service for NoopService {
        fn receive(
            &mut self,
            _ctx: &ServiceContext,
            _type_tag: TypeTag,
            _session: u32,
            _source: Handle,
            _payload: Option<Payload>,
        ) -> Flow {
            Flow::Continue
        }
    }

    fn register_one(registry: &Registry) -> Handle {
        let ctx = registry
            .register(|handle| ServiceContext::new(handle, Box::new(NoopService)))
            .unwrap();
        ctx.handle()
    }

    #[test]
    fn register_assigns_distinct_live_handles() {
        let registry = Registry::new(0);
        let a = register_one(&registry);
        let b = register_one(&registry);
        assert_ne!(a, b);
        assert!(registry.grab(a).is_some());
        assert!(registry.grab(b).is_some());
    }

    #[test]
    fn retire_makes_grab_fail() {
        let registry = Registry::new(0);
        let h = register_one(&registry);
        assert!(registry.retire(h).is_some());
        assert!(registry.grab(h).is_none());
        assert!(registry.retire(h).is_none());
    }

    #[test]
    fn name_handle_rejects_duplicate_name() {
        let registry = Registry::new(0);
        let a = register_one(&registry);
        let b = register_one(&registry);
        registry.name_handle(a, "svc").unwrap();
        assert_eq!(registry.find_name("svc"), Some(a));
        assert!(matches!(
            registry.name_handle(b, "svc"),
            Err(RegistryError::NameExists)
        ));
    }

    #[test]
    fn slot_table_grows_past_initial_capacity() {
        let registry = Registry::new(0);
        let mut handles = Vec::new();
        for _ in 0..200 {
            handles.push(register_one(&registry));
        }
        for h in handles {
            assert!(registry.grab(h).is_some());
        }
    }

    #[test]
    fn retired_slot_is_reused() {
        let registry = Registry::new(0);
        let a = register_one(&registry);
        registry.retire(a);
        let b = register_one(&registry);
        assert_eq!(a.local_id(), b.local_id());
    }
}
