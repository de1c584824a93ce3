// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! `do_decide` (spec §4.4.6): dispatch of a `Finality` to whatever
//! registered interest in its command hash. The core only knows how to
//! call through this narrow interface; the pending-decision map itself is
//! `e2c-app`'s (spec §4.6 expansion), so the core stays ignorant of client
//! sessions, oneshot channels, or reconnect semantics.

use crate::finality::Finality;

pub trait DecisionSink: Send + Sync {
    /// Invoked once per finalized command, in the order `commit_timer_cb`
    /// produces them. If nothing is registered for `fin.cmd_hash` the call
    /// still happens — "the finality is produced without side effect beyond
    /// stats" (spec §4.4.6) — implementations decide what "stats" means.
    fn on_decide(&self, fin: Finality);
}

/// A sink that drops every decision. Useful for tests that only care about
/// the `Vec<Finality>` `commit_timer_cb` returns directly.
#[derive(Default)]
pub struct NullDecisionSink;

impl DecisionSink for NullDecisionSink {
    fn on_decide(&self, _fin: Finality) {}
}
