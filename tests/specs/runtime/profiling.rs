// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `profile` (`spec.md` §6) opts a node into per-handler CPU accounting:
//! with it enabled, a context's `cpu_cost_accumulator` advances after a
//! handler call; with it left off (the default), it stays exactly zero.

use std::time::Duration;

use hub_core::{Config, Handle, Message, Payload, TypeTag};
use hub_runtime::{Flow, Node, Service, ServiceContext};

struct Busy;

impl Service for Busy {
    fn receive(
        &mut self,
        _ctx: &ServiceContext,
        _type_tag: TypeTag,
        _session: u32,
        _source: Handle,
        _payload: Option<Payload>,
    ) -> Flow {
        std::thread::sleep(Duration::from_millis(5));
        Flow::Continue
    }
}

#[test]
fn profile_enabled_accumulates_handler_cpu_time() {
    let config = Config { threads: 1, profile: true, ..Config::default() };
    let node = Node::start(&config).expect("node starts");

    let ctx = node.scheduler.register(Box::new(Busy));
    let handle = ctx.handle();
    node.scheduler
        .send(Message::new(Handle::NONE, handle, 0, TypeTag::Text, None));

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while ctx.cpu_cost_nanos() == 0 {
        assert!(std::time::Instant::now() < deadline, "cpu cost never recorded");
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(ctx.cpu_cost_nanos() >= Duration::from_millis(5).as_nanos() as u64);

    node.shutdown();
}

#[test]
fn profile_disabled_leaves_cpu_cost_at_zero() {
    let config = Config { threads: 1, profile: false, ..Config::default() };
    let node = Node::start(&config).expect("node starts");

    let ctx = node.scheduler.register(Box::new(Busy));
    let handle = ctx.handle();
    node.scheduler
        .send(Message::new(Handle::NONE, handle, 0, TypeTag::Text, None));

    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(ctx.cpu_cost_nanos(), 0);

    node.shutdown();
}
