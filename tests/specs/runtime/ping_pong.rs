// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A `Text` message sent to a registered service comes back as a
//! `Response` on the same session, dispatched by a real worker thread
//! rather than called directly.

use std::time::Duration;

use hub_core::{Handle, Message, Payload, TypeTag};
use hub_runtime::Node;

use crate::prelude::{test_config, Echo, Recorder};

#[test]
fn text_message_gets_an_echoed_response() {
    let config = test_config(2);
    let node = Node::start(&config).expect("node starts");

    let echo_ctx = node.scheduler.register(Box::new(Echo));
    let echo = echo_ctx.handle();

    let (recorder, rx) = Recorder::new();
    let recorder_ctx = node.scheduler.register(Box::new(recorder));
    let recorder_handle = recorder_ctx.handle();

    node.scheduler.send(Message::new(
        recorder_handle,
        echo,
        7,
        TypeTag::Text,
        Some(Payload::owned(b"ping".to_vec())),
    ));

    let recorded = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("echo reply arrives");
    assert_eq!(recorded.source, echo);
    assert_eq!(recorded.type_tag, TypeTag::Response);
    assert_eq!(recorded.session, 7);
    assert_eq!(recorded.payload.as_deref(), Some(&b"ping"[..]));

    node.shutdown();
}

#[test]
fn message_to_an_unregistered_handle_bounces_an_error_when_session_is_nonzero() {
    let config = test_config(1);
    let node = Node::start(&config).expect("node starts");

    let (recorder, rx) = Recorder::new();
    let recorder_ctx = node.scheduler.register(Box::new(recorder));
    let recorder_handle = recorder_ctx.handle();

    let nonexistent = Handle::new(0, 0xbeef);
    node.scheduler.send(Message::new(
        recorder_handle,
        nonexistent,
        11,
        TypeTag::Text,
        None,
    ));

    let recorded = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("error reply arrives");
    assert_eq!(recorded.type_tag, TypeTag::Error);
    assert_eq!(recorded.session, 11);

    node.shutdown();
}
