// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Messages to a single service are delivered strictly in send order, even
//! once the queue has grown well past its overload threshold — overload is
//! only ever logged, never a reason to drop or reorder a message.

use std::time::Duration;

use hub_core::{Handle, Message, Payload, TypeTag};
use hub_runtime::Node;

use crate::prelude::{test_config, Recorder};

#[test]
fn messages_are_delivered_in_order_past_the_overload_threshold() {
    let config = test_config(4);
    let node = Node::start(&config).expect("node starts");

    let (recorder, rx) = Recorder::new();
    let recorder_ctx = node.scheduler.register(Box::new(recorder));
    let target = recorder_ctx.handle();

    const COUNT: u32 = 2000;
    for session in 0..COUNT {
        node.scheduler.send(Message::new(
            Handle::NONE,
            target,
            session,
            TypeTag::Text,
            Some(Payload::owned(session.to_be_bytes().to_vec())),
        ));
    }

    for expected in 0..COUNT {
        let recorded = rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap_or_else(|_| panic!("message {expected} should have arrived"));
        assert_eq!(recorded.session, expected);
        assert_eq!(
            recorded.payload.as_deref(),
            Some(&expected.to_be_bytes()[..])
        );
    }

    node.shutdown();
}
