// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drives a `Harbor`-typed control command through the real registered
//! `HarborActor`, via `Scheduler::send` rather than calling the harbor's
//! own methods directly — this exercises the full dispatch path a peer's
//! `N`/`S`/`A` command actually takes once it reaches a live node.

use std::collections::HashMap;
use std::time::Duration;

use hub_core::{Handle, Message, Payload, TypeTag};
use hub_harbor::NameRouteOutcome;
use hub_runtime::Node;

use crate::prelude::{test_config, Recorder};

#[test]
fn name_registration_flushes_a_pending_send_through_the_live_actor() {
    let mut config = test_config(2);
    config.harbor = 1;
    let node = Node::start(&config).expect("node starts");
    let harbor_node = hub_harbor::start(&node.scheduler, 1, HashMap::new(), None);

    let (recorder, rx) = Recorder::new();
    let target_ctx = node.scheduler.register(Box::new(recorder));
    let target = target_ctx.handle();

    let pending = Message::new(
        Handle::NONE,
        Handle::NONE,
        42,
        TypeTag::Text,
        Some(Payload::owned(b"hi".to_vec())),
    );
    let outcome = harbor_node.harbor.send_to_name("svc", pending);
    assert!(matches!(outcome, NameRouteOutcome::QueryNeeded));

    let command = format!("N svc {:#x}", target.raw());
    node.scheduler.send(Message::new(
        Handle::NONE,
        harbor_node.handle,
        0,
        TypeTag::Harbor,
        Some(Payload::owned(command.into_bytes())),
    ));

    let recorded = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("flushed message arrives at the resolved target");
    assert_eq!(recorded.session, 42);
    assert_eq!(recorded.payload.as_deref(), Some(&b"hi"[..]));

    harbor_node.shutdown();
    node.shutdown();
}

#[test]
fn malformed_command_is_ignored_rather_than_panicking() {
    let mut config = test_config(1);
    config.harbor = 1;
    let node = Node::start(&config).expect("node starts");
    let harbor_node = hub_harbor::start(&node.scheduler, 1, HashMap::new(), None);

    node.scheduler.send(Message::new(
        Handle::NONE,
        harbor_node.handle,
        0,
        TypeTag::Harbor,
        Some(Payload::owned(b"Z nonsense".to_vec())),
    ));

    // Nothing to assert beyond "the actor keeps dispatching messages
    // afterward"; a panic during `receive` would otherwise poison the
    // worker and this second round trip would hang.
    let (recorder, rx) = Recorder::new();
    let target_ctx = node.scheduler.register(Box::new(recorder));
    let target = target_ctx.handle();
    node.scheduler
        .send(Message::new(Handle::NONE, target, 1, TypeTag::Text, None));
    rx.recv_timeout(Duration::from_secs(2))
        .expect("actor thread survived the malformed command");

    harbor_node.shutdown();
    node.shutdown();
}
