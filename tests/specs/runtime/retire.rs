// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `system.exit` retires a service; afterward a non-zero-session send
//! bounces an `Error` reply while a zero-session send is dropped silently,
//! per the source's retired-service behavior.

use std::time::Duration;

use hub_core::{Handle, Message, Payload, TypeTag};
use hub_runtime::{Flow, Service, ServiceContext};
use hub_runtime::Node;

use crate::prelude::{test_config, Recorder};

struct Noop;

impl Service for Noop {
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

#[test]
fn retired_service_bounces_nonzero_sessions_and_drops_zero_sessions() {
    let config = test_config(2);
    let node = Node::start(&config).expect("node starts");

    let target_ctx = node.scheduler.register(Box::new(Noop));
    let target = target_ctx.handle();

    node.scheduler.send(Message::system_exit(target));

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while node.scheduler.registry().grab(target).is_some() {
        assert!(std::time::Instant::now() < deadline, "service never retired");
        std::thread::sleep(Duration::from_millis(10));
    }

    let (recorder, rx) = Recorder::new();
    let recorder_ctx = node.scheduler.register(Box::new(recorder));
    let sender = recorder_ctx.handle();

    node.scheduler
        .send(Message::new(sender, target, 5, TypeTag::Text, None));
    let recorded = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("error reply arrives for a nonzero session");
    assert_eq!(recorded.type_tag, TypeTag::Error);
    assert_eq!(recorded.session, 5);

    node.scheduler
        .send(Message::new(sender, target, 0, TypeTag::Text, None));
    assert!(
        rx.recv_timeout(Duration::from_millis(300)).is_err(),
        "a session-zero send to a retired service must be dropped silently"
    );

    node.shutdown();
}
