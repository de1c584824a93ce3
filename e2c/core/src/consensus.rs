// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! `CoreStateMachine`: block delivery, equivocation detection, the height
//! map, commit timers, and the commit cascade (spec §4.4). This is the
//! hard part named in spec §1 — every method here is synchronous and runs
//! to completion on the single reactor thread (spec §5); I/O and timer
//! scheduling are returned as `Effect`s for the caller to perform.

use crate::chain::ChainView;
use crate::config::ReplicaConfig;
use crate::decision::DecisionSink;
use crate::effect::Effect;
use crate::error::CoreError;
use crate::finality::Finality;
use crate::pacemaker::Pacemaker;
use bytes::Bytes;
use e2c_crypto::{create_part_cert, SecretKey};
use e2c_storage::{Block, BlockHeight, Digest, EntityStorage, ReplicaId};
use e2c_tracing::emit;
use std::collections::HashSet;
use std::sync::Arc;

#[allow(dead_code)]
struct Equivocation<'a> {
    height: BlockHeight,
    existing: &'a str,
    incoming: &'a str,
}

/// The replicated state machine described in spec §4.4.
pub struct CoreStateMachine {
    own_id: ReplicaId,
    config: Arc<ReplicaConfig>,
    pacemaker: Arc<dyn Pacemaker>,
    decision_sink: Arc<dyn DecisionSink>,

    storage: EntityStorage,
    chain: ChainView,
    /// Decided block hashes (spec §3 runtime attribute `decision`). Kept
    /// out of `Block` itself since decision is a runtime attribute, not
    /// part of the content-addressed, immutable block (spec §3).
    committed: HashSet<Digest>,

    pub equivocations_seen: u64,
}

impl CoreStateMachine {
    pub fn new(
        own_id: ReplicaId,
        config: Arc<ReplicaConfig>,
        pacemaker: Arc<dyn Pacemaker>,
        decision_sink: Arc<dyn DecisionSink>,
    ) -> Self {
        let chain = ChainView::genesis_view();
        let mut storage = EntityStorage::new();
        storage.add_blk(chain.genesis.clone());
        storage.mark_delivered(&chain.genesis.hash());

        let mut committed = HashSet::new();
        committed.insert(chain.genesis.hash());

        Self {
            own_id,
            config,
            pacemaker,
            decision_sink,
            storage,
            chain,
            committed,
            equivocations_seen: 0,
        }
    }

    pub fn own_id(&self) -> ReplicaId {
        self.own_id
    }

    pub fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    pub fn pacemaker(&self) -> &Arc<dyn Pacemaker> {
        &self.pacemaker
    }

    pub fn storage_mut(&mut self) -> &mut EntityStorage {
        &mut self.storage
    }

    pub fn storage(&self) -> &EntityStorage {
        &self.storage
    }

    pub fn b_mark_height(&self) -> BlockHeight {
        self.chain.b_mark.height
    }

    pub fn b_comm_height(&self) -> BlockHeight {
        self.chain.b_comm.height
    }

    pub fn is_committed(&self, hash: &Digest) -> bool {
        self.committed.contains(hash)
    }

    /// §4.4.3 parent selection.
    pub fn compose_parents(&self) -> Vec<Arc<Block>> {
        self.chain.compose_parents()
    }

    /// §4.4.1 `on_deliver_blk`. Idempotent: returns `Ok(false)` if `blk` was
    /// already delivered, `Ok(true)` on first-time delivery, and
    /// `Err(NotDelivered)` if any parent hasn't resolved yet.
    pub fn on_deliver_blk(&mut self, blk: Arc<Block>) -> Result<bool, CoreError> {
        if self.storage.is_blk_delivered(&blk.hash()) {
            return Ok(false);
        }

        let mut parents = Vec::with_capacity(blk.parent_hashes.len());
        for h in &blk.parent_hashes {
            if !self.storage.is_blk_delivered(h) {
                return Err(CoreError::NotDelivered(*h));
            }
            parents.push(self.storage.find_blk(h).expect("delivered implies present"));
        }

        if let Some(direct) = parents.first() {
            if blk.height != direct.height + 1 {
                return Err(CoreError::SerializationError(format!(
                    "block {} declares height {} but direct parent {} has height {}",
                    blk.hash(),
                    blk.height,
                    direct.hash(),
                    direct.height
                )));
            }
        }

        self.storage.add_blk(blk.clone());
        for p in &parents {
            self.chain.tails.remove(&p.hash());
        }
        self.chain.tails.insert(blk.hash());
        self.storage.mark_delivered(&blk.hash());
        Ok(true)
    }

    /// §4.4.2 `update`. Duplicate at the same height: no-op. Equivocation
    /// (different hash at an occupied height): logged, dropped, no timer.
    /// Otherwise: inserted, `b_mark` advanced if needed, commit timer armed.
    pub fn update(&mut self, blk: Arc<Block>) -> Vec<Effect> {
        let h = blk.height;

        if let Some(existing) = self.chain.ht_blk_map.get(&h) {
            if existing.hash() == blk.hash() {
                return vec![];
            }
            emit!(
                WARN,
                Equivocation {
                    height: h,
                    existing: existing.hash().to_string().as_str(),
                    incoming: blk.hash().to_string().as_str()
                }
            );
            self.equivocations_seen += 1;
            return vec![];
        }

        self.chain.ht_blk_map.insert(h, blk.clone());
        if h > self.chain.b_mark.height {
            self.chain.b_mark = blk.clone();
        }

        vec![Effect::ArmCommitTimer {
            height: h,
            after: self.config.params.commit_delay(),
        }]
    }

    /// §4.4.3 `on_propose`. `parents` must be non-empty; `parents[0]` is the
    /// direct parent determining height. Builds, signs, delivers, registers
    /// the commit timer, and returns the block plus the effects to perform
    /// (arming the timer and broadcasting).
    pub fn on_propose(
        &mut self,
        cmds: Vec<Digest>,
        parents: Vec<Arc<Block>>,
        extra: Bytes,
        signing_key: &SecretKey,
    ) -> Result<(Arc<Block>, Vec<Effect>), CoreError> {
        if parents.is_empty() {
            return Err(CoreError::SerializationError(
                "on_propose requires at least one parent".into(),
            ));
        }
        debug_assert_eq!(
            self.pacemaker.get_proposer(),
            self.own_id,
            "on_propose called while not the current proposer"
        );

        let parent_hashes: Vec<Digest> = parents.iter().map(|p| p.hash()).collect();
        let height = parents[0].height + 1;

        let unsigned = Block::seal(self.own_id, height, parent_hashes.clone(), cmds.clone(), extra.clone(), None);
        let sig = create_part_cert(signing_key, unsigned.hash().as_bytes());
        let blk = Block::from_parts(self.own_id, height, parent_hashes, cmds, extra, Some(sig));

        for p in &parents {
            self.chain.tails.remove(&p.hash());
        }

        self.on_deliver_blk(blk.clone())?;
        let mut effects = self.update(blk.clone());
        effects.push(Effect::Broadcast(blk.clone()));

        Ok((blk, effects))
    }

    /// §4.4.4 `on_receive_proposal`. `sig_valid` must already reflect the
    /// result of `Verifier::verify` — verification is async and therefore
    /// happens in the reactor, before this (synchronous) call. Returns the
    /// effects to perform; an empty vector means "drop, do not forward"
    /// (duplicate, equivocation, or a rejected validation step).
    pub fn on_receive_proposal(
        &mut self,
        blk: Arc<Block>,
        sig_valid: bool,
    ) -> Result<Vec<Effect>, CoreError> {
        if blk.height == 0 {
            return Err(CoreError::SerializationError(
                "genesis is never proposed".into(),
            ));
        }

        let expected = self.pacemaker.get_proposer();
        if blk.proposer != expected {
            return Err(CoreError::WrongProposer {
                proposer: blk.proposer,
                expected,
            });
        }

        if !sig_valid {
            return Err(CoreError::BadSignature(blk.proposer));
        }

        self.on_deliver_blk(blk.clone())?;
        let effects = self.update(blk.clone());

        // `update` only returns a non-empty effect list on first-time
        // acceptance into the height map; duplicates and equivocations both
        // produce `vec![]`, which here doubles as "do not forward" (spec
        // §4.4.4: "forward only on first successful receipt").
        if effects.is_empty() {
            return Ok(effects);
        }

        let mut effects = effects;
        effects.push(Effect::Broadcast(blk));
        Ok(effects)
    }

    /// §4.4.5 `commit_timer_cb`. Walks down from `h`, collecting
    /// not-yet-committed ancestors, stopping at the first already-committed
    /// block (genesis is pre-committed, so this always terminates). Commits
    /// are applied ascending, and the per-command `Finality`s are likewise
    /// emitted in ascending height then `cmd_idx` order (spec §5).
    pub fn commit_timer_cb(&mut self, h: BlockHeight) -> (Vec<Finality>, Vec<Effect>) {
        let mut pending = Vec::new();
        let mut height = h;
        loop {
            let blk = match self.chain.ht_blk_map.get(&height) {
                Some(b) => b.clone(),
                None => break,
            };
            if self.committed.contains(&blk.hash()) {
                break;
            }
            pending.push(blk);
            if height == 0 {
                break;
            }
            height -= 1;
        }
        pending.reverse();

        let mut finalities = Vec::new();
        let mut effects = Vec::new();

        for blk in pending {
            self.committed.insert(blk.hash());
            effects.push(Effect::CancelCommitTimer { height: blk.height });
            self.pacemaker.on_consensus(&blk);

            for (j, cmd_hash) in blk.cmds.iter().enumerate() {
                let fin = Finality::committed(self.own_id, j as u32, blk.height, *cmd_hash, blk.hash());
                self.decision_sink.on_decide(fin.clone());
                finalities.push(fin);
            }

            if blk.height > self.chain.b_comm.height {
                self.chain.b_comm = blk.clone();
            }
        }

        (finalities, effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::NullDecisionSink;
    use crate::pacemaker::FixedPacemaker;
    use e2c_storage::Digest;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;

    fn test_config(own: ReplicaId) -> Arc<ReplicaConfig> {
        use crate::config::RuntimeParams;
        Arc::new(ReplicaConfig::new(
            own,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000),
            vec![],
            RuntimeParams::new(Duration::from_millis(100), 4),
        ))
    }

    fn machine(own: ReplicaId, proposer: ReplicaId) -> CoreStateMachine {
        CoreStateMachine::new(
            own,
            test_config(own),
            Arc::new(FixedPacemaker::new(proposer)),
            Arc::new(NullDecisionSink),
        )
    }

    fn signing_key(seed: u8) -> SecretKey {
        let mut rng = ChaCha20Rng::from_seed([seed; 32]);
        SecretKey::random(&mut rng)
    }

    #[test]
    fn propose_then_commit_emits_ordered_finalities() {
        let mut core = machine(1, 1);
        let sk = signing_key(1);

        let parents = core.compose_parents();
        let cmds = vec![Digest::hash(b"c0"), Digest::hash(b"c1")];
        let (blk, effects) = core
            .on_propose(cmds.clone(), parents, Bytes::new(), &sk)
            .unwrap();
        assert_eq!(blk.height, 1);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::ArmCommitTimer { height: 1, .. })));
        assert!(effects.iter().any(|e| matches!(e, Effect::Broadcast(_))));

        let (finalities, cancels) = core.commit_timer_cb(1);
        assert!(cancels
            .iter()
            .any(|e| matches!(e, Effect::CancelCommitTimer { height: 1 })));
        assert_eq!(finalities.len(), 2);
        assert_eq!(finalities[0].cmd_idx, 0);
        assert_eq!(finalities[1].cmd_idx, 1);
        assert!(finalities.iter().all(|f| f.decision == 1));
        assert_eq!(core.b_comm_height(), 1);
    }

    #[test]
    fn duplicate_update_is_noop() {
        let mut core = machine(1, 1);
        let sk = signing_key(2);
        let parents = core.compose_parents();
        let (blk, _) = core.on_propose(vec![], parents, Bytes::new(), &sk).unwrap();

        // Simulate receiving the identical block again via `on_receive_proposal`.
        let effects = core.on_receive_proposal(blk, true).unwrap();
        assert!(effects.is_empty(), "duplicate must not re-broadcast");
    }

    #[test]
    fn equivocating_block_is_dropped_without_committing() {
        let mut core = machine(2, 1);
        let sk = signing_key(3);

        let parents = core.compose_parents();
        let a = Block::seal(1, 1, parents.iter().map(|p| p.hash()).collect(), vec![Digest::hash(b"a")], Bytes::new(), None);
        let sig_a = create_part_cert(&sk, a.hash().as_bytes());
        let a = Block::from_parts(1, 1, a.parent_hashes.clone(), a.cmds.clone(), a.extra.clone(), Some(sig_a));

        let b = Block::seal(1, 1, a.parent_hashes.clone(), vec![Digest::hash(b"b")], Bytes::new(), None);
        let sig_b = create_part_cert(&sk, b.hash().as_bytes());
        let b = Block::from_parts(1, 1, b.parent_hashes.clone(), b.cmds.clone(), b.extra.clone(), Some(sig_b));

        let effects_a = core.on_receive_proposal(a.clone(), true).unwrap();
        assert!(!effects_a.is_empty());

        let err = core.on_receive_proposal(b, true);
        // `on_deliver_blk` itself succeeds (parents resolve); it's `update`
        // that silently drops the equivocating block.
        assert!(err.is_ok());
        assert_eq!(core.equivocations_seen, 1);

        let (finalities, _) = core.commit_timer_cb(1);
        assert_eq!(finalities.len(), 1);
        assert_eq!(finalities[0].blk_hash, a.hash());
    }

    #[test]
    fn wrong_proposer_is_rejected() {
        let mut core = machine(2, 1);
        let sk = signing_key(4);
        let parents = core.compose_parents();
        let blk = Block::seal(2, 1, parents.iter().map(|p| p.hash()).collect(), vec![], Bytes::new(), None);
        let sig = create_part_cert(&sk, blk.hash().as_bytes());
        let blk = Block::from_parts(2, 1, blk.parent_hashes.clone(), blk.cmds.clone(), blk.extra.clone(), Some(sig));

        let err = core.on_receive_proposal(blk, true).unwrap_err();
        assert!(matches!(err, CoreError::WrongProposer { proposer: 2, expected: 1 }));
    }

    #[test]
    fn bad_signature_is_rejected() {
        let mut core = machine(2, 1);
        let parents = core.compose_parents();
        let blk = Block::seal(1, 1, parents.iter().map(|p| p.hash()).collect(), vec![], Bytes::new(), None);

        let err = core.on_receive_proposal(blk, false).unwrap_err();
        assert!(matches!(err, CoreError::BadSignature(1)));
    }

    #[test]
    fn missing_parent_is_not_delivered() {
        let mut core = machine(2, 1);
        let dangling_parent = Digest::hash(b"missing");
        let blk = Block::seal(1, 1, vec![dangling_parent], vec![], Bytes::new(), None);
        let err = core.on_deliver_blk(blk).unwrap_err();
        assert!(matches!(err, CoreError::NotDelivered(h) if h == dangling_parent));
    }

    #[test]
    fn chain_commit_cascades_ancestors() {
        let mut core = machine(1, 1);
        let sk = signing_key(5);

        let parents1 = core.compose_parents();
        let (b1, _) = core.on_propose(vec![Digest::hash(b"c0")], parents1, Bytes::new(), &sk).unwrap();

        let parents2 = core.compose_parents();
        assert_eq!(parents2[0].hash(), b1.hash());
        let (b2, _) = core.on_propose(vec![Digest::hash(b"c1")], parents2, Bytes::new(), &sk).unwrap();

        // Only height 2's timer ever fires; height 1 must cascade-commit too.
        let (finalities, effects) = core.commit_timer_cb(2);
        assert_eq!(finalities.len(), 2);
        assert_eq!(finalities[0].blk_hash, b1.hash());
        assert_eq!(finalities[1].blk_hash, b2.hash());
        assert!(core.is_committed(&b1.hash()));
        assert!(core.is_committed(&b2.hash()));
        assert_eq!(
            effects
                .iter()
                .filter(|e| matches!(e, Effect::CancelCommitTimer { .. }))
                .count(),
            2
        );
    }
}
