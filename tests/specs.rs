// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios driven through real `Node::start` worker/timer/
//! watchdog threads and, for the harbor scenarios, real TCP sockets — the
//! workspace's crate-level unit tests exercise each module against a
//! direct call; these exercise the whole wired-up system the way `hubd`
//! itself assembles it.


#[path = "specs/runtime/ping_pong.rs"]
mod runtime_ping_pong;
#[path = "specs/runtime/ordering.rs"]
mod runtime_ordering;
#[path = "specs/runtime/retire.rs"]
mod runtime_retire;
#[path = "specs/runtime/profiling.rs"]
mod runtime_profiling;
#[path = "specs/harbor/control_command.rs"]
mod harbor_control_command;
#[path = "specs/harbor/wire_round_trip.rs"]
mod harbor_wire_round_trip;
