// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The pacemaker: proposer selection, leader-beat scheduling, and the
//! impeachment hook (spec §4.3). Modeled as a capability-bearing
//! collaborator the core holds one owning reference to and calls through a
//! narrow interface (spec §9 "Pacemaker polymorphism"), the same shape as
//! `ParentFinalityProvider` in the topdown syncer.

use async_trait::async_trait;
use e2c_storage::{Block, ReplicaId};
use std::sync::atomic::{AtomicU16, Ordering};

/// Oracle selecting the current proposer and scheduling proposal beats and
/// impeachments (spec §4.3, GLOSSARY).
#[async_trait]
pub trait Pacemaker: Send + Sync {
    /// The replica currently expected to propose.
    fn get_proposer(&self) -> ReplicaId;

    /// Resolves once the caller should propose, with the replica that
    /// should do so (normally `get_proposer()` at the time of resolution).
    async fn beat(&self) -> ReplicaId;

    /// Like `beat`, but informs the pacemaker who proposed last, for
    /// implementations that schedule beats relative to the previous
    /// proposer rather than wall-clock time alone.
    async fn beat_resp(&self, last_proposer: ReplicaId) -> ReplicaId;

    /// Advance the proposer to `(current + 1) mod N` (spec §4.4, S4).
    /// Driven by an external, app-layer no-progress timer — the core never
    /// calls this on its own (spec §1 Non-goals: view change is out of scope).
    fn impeach(&self);

    /// Notification hook fired once per committed block, in commit order
    /// (spec §4.4.5 "invoke `do_consensus(blk)`").
    fn on_consensus(&self, blk: &Block);
}

/// A replica identifies itself as leader iff `pacemaker.get_proposer() == own_id`.
pub fn is_leader(pacemaker: &dyn Pacemaker, own_id: ReplicaId) -> bool {
    pacemaker.get_proposer() == own_id
}

/// Fixed-proposer pacemaker: one replica proposes forever. `beat`/`beat_resp`
/// resolve immediately (spec §4.3 "default implementation ... resolves
/// beat/beat_resp immediately with the current proposer"). `impeach` is a
/// no-op since there is nobody else configured to take over.
pub struct FixedPacemaker {
    proposer: ReplicaId,
}

impl FixedPacemaker {
    pub fn new(proposer: ReplicaId) -> Self {
        Self { proposer }
    }
}

#[async_trait]
impl Pacemaker for FixedPacemaker {
    fn get_proposer(&self) -> ReplicaId {
        self.proposer
    }

    async fn beat(&self) -> ReplicaId {
        self.proposer
    }

    async fn beat_resp(&self, _last_proposer: ReplicaId) -> ReplicaId {
        self.proposer
    }

    fn impeach(&self) {}

    fn on_consensus(&self, _blk: &Block) {}
}

/// Rotating pacemaker: the proposer advances by one, modulo the replica
/// count, each time a block commits, and can additionally be bumped ahead
/// by an explicit `impeach()` (spec §4.3.1 expansion; used by scenario S4).
pub struct RoundRobinPacemaker {
    num_replicas: u16,
    current: AtomicU16,
}

impl RoundRobinPacemaker {
    pub fn new(num_replicas: u16, initial_proposer: ReplicaId) -> Self {
        Self {
            num_replicas,
            current: AtomicU16::new(initial_proposer),
        }
    }

    fn advance(&self) -> ReplicaId {
        self.current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                Some((c + 1) % self.num_replicas)
            })
            .expect("update fn always returns Some");
        self.current.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pacemaker for RoundRobinPacemaker {
    fn get_proposer(&self) -> ReplicaId {
        self.current.load(Ordering::SeqCst)
    }

    async fn beat(&self) -> ReplicaId {
        self.get_proposer()
    }

    async fn beat_resp(&self, _last_proposer: ReplicaId) -> ReplicaId {
        self.get_proposer()
    }

    fn impeach(&self) {
        self.advance();
    }

    fn on_consensus(&self, blk: &Block) {
        // Rotate relative to the committing block's own proposer, not the
        // live `current` value, so a stale impeachment that already moved
        // `current` ahead of `blk.proposer` is not clobbered backwards.
        let next = (blk.proposer + 1) % self.num_replicas;
        self.current.store(next, Ordering::SeqCst);
    }
}
