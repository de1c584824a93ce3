// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The single-threaded reactor (spec §5 expansion): one `tokio::task`
//! running a `select!` loop over inbound events and a `DelayQueue` holding
//! both commit timers (keyed by height) and fetch-retry timers (keyed by
//! request). This is where `Effect`s returned by `CoreStateMachine` get
//! carried out, and where the block-fetch protocol (spec §4.4.7) lives: a
//! proposal blocked on a missing ancestor is parked until that ancestor is
//! delivered, then retried. The spec §9 design note calls per-block
//! dedicated event loops a mis-design; here there is exactly one clock,
//! owned by this loop, matching the polling `tokio::select!` shape of
//! `fendermint_vm_topdown`'s parent syncer (adapted from a polling cadence
//! to event-driven one-shot deadlines).

use crate::consensus::CoreStateMachine;
use crate::effect::Effect;
use crate::error::CoreError;
use crate::pacemaker::is_leader;
use crate::verifier::Verifier;
use async_trait::async_trait;
use bytes::Bytes;
use e2c_crypto::SecretKey;
use e2c_storage::{Block, BlockHeight, Digest, ReplicaId};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::time::delay_queue::Key as DelayKey;
use tokio_util::time::DelayQueue;

/// Everything the reactor needs to move bytes: broadcasting proposals and
/// issuing `ReqBlock` fetches (spec §4.4.7, §4.5). Implemented by
/// `e2c-net`'s `NetworkBinding`; an in-memory implementation backs the
/// scenario tests in `tests/`.
#[async_trait]
pub trait NetworkSink: Send + Sync {
    async fn broadcast(&self, blk: Arc<Block>);
    async fn request_blocks(&self, hashes: Vec<Digest>, from: ReplicaId);
}

/// Supplies the next batch of pending client commands to the leader when it
/// beats (spec §2 data flow: "the leader batches B commands"). Implemented
/// by `e2c-app`'s `AppShell`.
pub trait CommandSource: Send + Sync {
    fn take_batch(&self, max: usize) -> Vec<Digest>;
}

/// Inbound events the reactor reacts to, fed by the network binding and the
/// client intake thread via a lock-free mpsc queue (spec §5).
pub enum ReactorEvent {
    /// A `Propose` message, already signature-checked by the caller
    /// (verification dispatched off-reactor, spec §4.2.1). `from` is the
    /// peer the proposal arrived from — the initial fetch target if an
    /// ancestor turns out to be missing (spec §4.4.7).
    Proposal {
        blk: Arc<Block>,
        sig_valid: bool,
        from: ReplicaId,
    },
    /// A `RespBlock` delivery: blocks to insert into storage, attempted in
    /// ascending height order so parents land before children.
    BlocksFetched { blocks: Vec<Arc<Block>> },
    /// A client command was accepted into the pending queue; wakes the
    /// leader path to check whether a batch is ready to propose.
    CommandSubmitted,
}

enum TimerKind {
    Commit { height: BlockHeight },
    FetchRetry { hashes: Vec<Digest>, from: ReplicaId },
}

/// A proposal that could not be delivered because one of its ancestors
/// hasn't arrived yet; retried once that ancestor is delivered.
struct BlockedProposal {
    blk: Arc<Block>,
    sig_valid: bool,
    from: ReplicaId,
}

/// Drives one replica's `CoreStateMachine` to completion (i.e. forever,
/// until the channel closes). Owns the commit/fetch timer queue exclusively,
/// so `ht_blk_map` and `tails` are only ever touched from this task.
pub struct Reactor<N: NetworkSink, V: Verifier, C: CommandSource> {
    core: CoreStateMachine,
    sink: Arc<N>,
    verifier: Arc<V>,
    cmd_source: Arc<C>,
    signing_key: SecretKey,

    events: mpsc::Receiver<ReactorEvent>,
    timers: DelayQueue<TimerKind>,
    /// Maps a height to its live commit-timer key, so `CancelCommitTimer`
    /// can find and remove it (spec §4.4.5 "cancel its timer").
    commit_timer_keys: HashMap<BlockHeight, DelayKey>,
    /// Proposals parked on a missing ancestor hash, retried on delivery.
    blocked_on: HashMap<Digest, Vec<BlockedProposal>>,
}

impl<N: NetworkSink, V: Verifier, C: CommandSource> Reactor<N, V, C> {
    pub fn new(
        core: CoreStateMachine,
        sink: Arc<N>,
        verifier: Arc<V>,
        cmd_source: Arc<C>,
        signing_key: SecretKey,
        events: mpsc::Receiver<ReactorEvent>,
    ) -> Self {
        Self {
            core,
            sink,
            verifier,
            cmd_source,
            signing_key,
            events,
            timers: DelayQueue::new(),
            commit_timer_keys: HashMap::new(),
            blocked_on: HashMap::new(),
        }
    }

    /// Verify a remote proposal's signature off the reactor (spec §4.2.1),
    /// then hand the result to `ReactorEvent::Proposal`. Call this from the
    /// network binding before enqueuing the event.
    pub async fn verify(&self, blk: &Block) -> bool {
        match self.core.config().pubkey(blk.proposer) {
            Some(pk) => self.verifier.verify(blk, &pk).await,
            None => blk.is_genesis(),
        }
    }

    pub fn core(&self) -> &CoreStateMachine {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut CoreStateMachine {
        &mut self.core
    }

    /// Run the reactor loop until the event channel is closed.
    pub async fn run(&mut self) {
        use tokio_stream::StreamExt;

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Some(ev) => self.handle_event(ev).await,
                        None => return,
                    }
                }
                Some(expired) = self.timers.next() => {
                    self.handle_timer(expired.into_inner()).await;
                }
            }
        }
    }

    /// Dispatch a single event. `run` calls this in a loop; exposed
    /// directly so tests can drive the reactor step by step without a live
    /// channel.
    pub async fn handle_event(&mut self, event: ReactorEvent) {
        match event {
            ReactorEvent::Proposal { blk, sig_valid, from } => {
                self.try_receive_proposal(blk, sig_valid, from).await;
            }
            ReactorEvent::BlocksFetched { mut blocks } => {
                blocks.sort_by_key(|b| b.height);
                for blk in blocks {
                    let hash = blk.hash();
                    match self.core.on_deliver_blk(blk.clone()) {
                        Ok(true) => {
                            // A fetched ancestor is accepted into the height
                            // map exactly like a received proposal, so it
                            // takes part in the commit cascade too.
                            let effects = self.core.update(blk);
                            self.apply_effects(effects).await;
                            self.retry_blocked_on(hash).await;
                        }
                        Ok(false) => self.retry_blocked_on(hash).await,
                        Err(e) => self.log_dropped(&e),
                    }
                }
            }
            ReactorEvent::CommandSubmitted => {
                self.maybe_propose().await;
            }
        }
    }

    /// Attempt delivery + acceptance of a proposal; park it under the
    /// missing ancestor's hash and issue a fetch if a parent is absent
    /// (spec §4.4.7).
    async fn try_receive_proposal(&mut self, blk: Arc<Block>, sig_valid: bool, from: ReplicaId) {
        match self.core.on_receive_proposal(blk.clone(), sig_valid) {
            Ok(effects) => self.apply_effects(effects).await,
            Err(CoreError::NotDelivered(missing)) => {
                self.blocked_on
                    .entry(missing)
                    .or_default()
                    .push(BlockedProposal { blk, sig_valid, from });
                self.request_blocks(vec![missing], from).await;
            }
            Err(e) => self.log_dropped(&e),
        }
    }

    /// Retry every proposal that was waiting on `hash`, now delivered. A
    /// retry may itself discover a *different* missing ancestor, in which
    /// case it re-parks under that hash — this converges because delivery
    /// only flows forward.
    async fn retry_blocked_on(&mut self, hash: Digest) {
        let waiters = self.blocked_on.remove(&hash).unwrap_or_default();
        for w in waiters {
            self.try_receive_proposal(w.blk, w.sig_valid, w.from).await;
        }
    }

    /// If we are the current leader and enough commands are pending, batch
    /// and propose (spec §2 data flow).
    async fn maybe_propose(&mut self) {
        if !is_leader(self.core.pacemaker().as_ref(), self.core.own_id()) {
            return;
        }
        let batch = self.cmd_source.take_batch(self.core.config().params.block_size);
        if batch.is_empty() {
            return;
        }
        let parents = self.core.compose_parents();
        match self
            .core
            .on_propose(batch, parents, Bytes::new(), &self.signing_key)
        {
            Ok((_blk, effects)) => self.apply_effects(effects).await,
            Err(e) => self.log_dropped(&e),
        }
    }

    async fn handle_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::Commit { height } => {
                self.commit_timer_keys.remove(&height);
                let (_finalities, effects) = self.core.commit_timer_cb(height);
                self.apply_effects(effects).await;
            }
            TimerKind::FetchRetry { hashes, from } => {
                let still_missing: Vec<Digest> = hashes
                    .into_iter()
                    .filter(|h| !self.core.storage().is_blk_fetched(h))
                    .collect();
                if still_missing.is_empty() {
                    return;
                }
                self.retry_fetch(still_missing, from).await;
            }
        }
    }

    /// Issue the initial `ReqBlock` to `from` — the peer that delivered the
    /// proposal referencing the missing ancestor (spec §4.4.7 "initial
    /// target: the peer that delivered the proposal") — and arm its retry
    /// timer, with small jitter so a cluster of simultaneous timeouts
    /// doesn't re-request in lockstep (spec §5 "Cancellation/timeouts").
    async fn request_blocks(&mut self, hashes: Vec<Digest>, from: ReplicaId) {
        self.sink.request_blocks(hashes.clone(), from).await;
        self.arm_fetch_retry(hashes, from);
    }

    /// Re-issue a timed-out fetch to every known peer, not just the
    /// original target — the peer that never answered may be the one
    /// that's unavailable (spec §5: "the fetch is re-sent to all known
    /// replicas holding the entity"). `from` is retained only to label the
    /// retry timer; it no longer narrows who the request goes to.
    async fn retry_fetch(&mut self, hashes: Vec<Digest>, from: ReplicaId) {
        for peer in self.core.config().all_peer_ids() {
            self.sink.request_blocks(hashes.clone(), peer).await;
        }
        self.arm_fetch_retry(hashes, from);
    }

    fn arm_fetch_retry(&mut self, hashes: Vec<Digest>, from: ReplicaId) {
        let base = self.core.config().params.entity_wait_timeout;
        let jitter = rand::thread_rng().gen_range(0..250);
        self.timers.insert(
            TimerKind::FetchRetry { hashes, from },
            base + std::time::Duration::from_millis(jitter),
        );
    }

    async fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Broadcast(blk) => self.sink.broadcast(blk).await,
                Effect::ArmCommitTimer { height, after } => {
                    let key = self.timers.insert(TimerKind::Commit { height }, after);
                    self.commit_timer_keys.insert(height, key);
                }
                Effect::CancelCommitTimer { height } => {
                    if let Some(key) = self.commit_timer_keys.remove(&height) {
                        self.timers.try_remove(&key);
                    }
                }
            }
        }
    }

    fn log_dropped(&self, err: &CoreError) {
        tracing::warn!(error = %err, "dropping message");
    }
}
