// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two real nodes, two real TCP sockets: node 1 dials node 2, the peers
//! handshake, and an application message crosses the wire to a service
//! registered on the far side.
//!
//! The inbound connection's fd is never observed dynamically — nothing in
//! `HarborActor` surfaces it past a debug log (see `hub_harbor::lib`'s
//! `SocketEvent::Accepted` arm). This test is the only connection its
//! listener ever accepts, so the socket thread's sequential token
//! allocation (starting at 1, since the listener itself owns token 0)
//! makes the accepted fd deterministically `1`; the `A 1 1` command below
//! stands in for the external identification step cluster membership
//! would otherwise provide.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use hub_core::{Handle, Message, Payload, TypeTag};
use hub_runtime::Node;

use crate::prelude::{test_config, Recorder};

fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind an ephemeral port");
    listener.local_addr().expect("read local addr")
}

#[test]
fn application_message_crosses_two_real_nodes_over_tcp() {
    let listen_addr = free_addr();

    let mut config_b = test_config(2);
    config_b.harbor = 2;
    let node_b = Node::start(&config_b).expect("node b starts");
    let harbor_b = hub_harbor::start(&node_b.scheduler, 2, HashMap::new(), Some(listen_addr));

    let (recorder, rx) = Recorder::new();
    let target_ctx = node_b.scheduler.register(Box::new(recorder));
    let target = target_ctx.handle();

    let mut config_a = test_config(2);
    config_a.harbor = 1;
    let node_a = Node::start(&config_a).expect("node a starts");
    let mut peer_addrs = HashMap::new();
    peer_addrs.insert(2u8, listen_addr);
    let harbor_a = hub_harbor::start(&node_a.scheduler, 1, peer_addrs, None);

    // Ask node 1's harbor to dial node 2. `route` below queues the
    // application frame regardless of whether the connect has landed yet
    // (peers start in `Wait` status and flush once handshaked), so the two
    // sends do not need to be ordered against the connect completing.
    node_a.scheduler.send(Message::new(
        Handle::NONE,
        harbor_a.handle,
        0,
        TypeTag::Harbor,
        Some(Payload::owned(b"S 0 2".to_vec())),
    ));

    node_a.scheduler.send(Message::new(
        Handle::new(0, 1),
        target,
        99,
        TypeTag::Text,
        Some(Payload::owned(b"hello from node 1".to_vec())),
    ));

    // Give the real connect/accept cycle (each side polls at most every
    // 200ms) time to land before identifying the inbound connection.
    std::thread::sleep(Duration::from_millis(1500));
    node_b.scheduler.send(Message::new(
        Handle::NONE,
        harbor_b.handle,
        0,
        TypeTag::Harbor,
        Some(Payload::owned(b"A 1 1".to_vec())),
    ));

    let recorded = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("application message crosses the wire and reaches the far service");
    assert_eq!(recorded.session, 99);
    assert_eq!(
        recorded.payload.as_deref(),
        Some(&b"hello from node 1"[..])
    );

    harbor_a.shutdown();
    harbor_b.shutdown();
    node_a.shutdown();
    node_b.shutdown();
}
