// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! A content-addressed, in-memory cache of blocks and commands, plus the
//! delivery-waiter bookkeeping the block-fetch protocol needs.
//!
//! There is no persistence layer here (spec §1 Non-goals: "state snapshots
//! or pruning beyond the in-memory cache") — this is a `HashMap`-backed
//! cache, not a KV store with transactions like `fendermint_storage`'s
//! `KVStore`; the spec's release policy is reference-count driven, which in
//! safe Rust falls out naturally from `Arc` once a caller lets go of its
//! handle, so `EntityStorage` itself never needs an explicit eviction pass
//! for the default configuration (see `e2c_core::config::ReplicaConfig::retain_window`
//! for the opt-in bound).

use crate::block::Block;
use crate::digest::Digest;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Content-addressed cache of blocks and commands, and the delivery-waiter
/// registry the block-fetch protocol (spec §4.4.7) uses to resolve pending
/// futures when a target block becomes delivered.
#[derive(Default)]
pub struct EntityStorage {
    blocks: HashMap<Digest, Arc<Block>>,
    delivered_blocks: HashSet<Digest>,
    block_waiters: HashMap<Digest, Vec<oneshot::Sender<()>>>,

    /// Command payloads are opaque to the core (spec §1 Non-goals); we only
    /// track presence/delivery, plus an optional payload a caller chose to
    /// attach (e.g. for local re-submission after a late reconnect, spec §4.4.6).
    commands: HashMap<Digest, Option<Bytes>>,
    delivered_commands: HashSet<Digest>,
}

impl EntityStorage {
    pub fn new() -> Self {
        Self::default()
    }

    // --- blocks -----------------------------------------------------

    /// Insert a block if not already present. Returns `true` if this is a
    /// new entry (first-time receipt), `false` for a duplicate — the
    /// duplicate-forward scenario (spec S6) relies on this to short-circuit
    /// before `update` is ever called a second time.
    pub fn add_blk(&mut self, blk: Arc<Block>) -> bool {
        let hash = blk.hash();
        if self.blocks.contains_key(&hash) {
            return false;
        }
        self.blocks.insert(hash, blk);
        true
    }

    pub fn find_blk(&self, hash: &Digest) -> Option<Arc<Block>> {
        self.blocks.get(hash).cloned()
    }

    /// Present in the cache, whether or not its parents have resolved.
    pub fn is_blk_fetched(&self, hash: &Digest) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Present *and* delivered (all parents resolved; spec §4.4.1).
    pub fn is_blk_delivered(&self, hash: &Digest) -> bool {
        self.delivered_blocks.contains(hash)
    }

    /// Mark a block delivered and wake anyone waiting on it.
    ///
    /// Called by `e2c_core::consensus::on_deliver_blk` once it has resolved
    /// every parent; storage itself does not decide when a block is
    /// deliverable, it only records the fact and notifies waiters.
    pub fn mark_delivered(&mut self, hash: &Digest) {
        self.delivered_blocks.insert(*hash);
        if let Some(waiters) = self.block_waiters.remove(hash) {
            for tx in waiters {
                let _ = tx.send(());
            }
        }
    }

    /// Register interest in a block's delivery. Resolves immediately if
    /// already delivered, matching the fetch protocol's "delivery
    /// notifications resolve any registered waiters" behavior (spec §4.4.7).
    pub fn wait_for_delivery(&mut self, hash: Digest) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        if self.is_blk_delivered(&hash) {
            let _ = tx.send(());
        } else {
            self.block_waiters.entry(hash).or_default().push(tx);
        }
        rx
    }

    // --- commands -----------------------------------------------------

    pub fn add_cmd(&mut self, hash: Digest, payload: Option<Bytes>) -> bool {
        if self.commands.contains_key(&hash) {
            return false;
        }
        self.commands.insert(hash, payload);
        true
    }

    pub fn is_cmd_fetched(&self, hash: &Digest) -> bool {
        self.commands.contains_key(hash)
    }

    pub fn is_cmd_delivered(&self, hash: &Digest) -> bool {
        self.delivered_commands.contains(hash)
    }

    pub fn mark_cmd_delivered(&mut self, hash: &Digest) {
        self.delivered_commands.insert(*hash);
    }

    pub fn find_cmd(&self, hash: &Digest) -> Option<Option<Bytes>> {
        self.commands.get(hash).cloned()
    }

    /// Drop every entry at or below `below_height` whose block is already
    /// committed, per the opt-in retention window (spec §4.1.1 expansion).
    /// Conservative: never drops an entry this map doesn't independently
    /// know is committed, so callers pass the set of hashes safe to evict.
    pub fn evict(&mut self, hashes: impl IntoIterator<Item = Digest>) {
        for h in hashes {
            self.blocks.remove(&h);
            self.delivered_blocks.remove(&h);
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}
