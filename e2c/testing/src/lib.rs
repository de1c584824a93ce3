// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Shared harness for driving a small, in-memory cluster of
//! `CoreStateMachine`s without a network stack, the `fendermint_testing`
//! style of exercising protocol logic directly. Used by `e2c-core`'s
//! scenario tests and reusable by `e2c-net`/`e2c-app` integration tests.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use e2c_core::{
    CoreStateMachine, FixedPacemaker, NetworkSink, NullDecisionSink, PeerConfig, ReplicaConfig,
    RuntimeParams,
};
use e2c_crypto::{create_part_cert, SecretKey};
use e2c_storage::{Block, Digest, ReplicaId};

/// `127.0.0.1:<port>`, for `ReplicaConfig`s that never actually bind.
pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

/// `n` deterministic keys, seeded so a test run is reproducible.
pub fn keys(n: u16) -> Vec<SecretKey> {
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    (0..n)
        .map(|i| {
            let mut rng = ChaCha20Rng::from_seed([i as u8 + 1; 32]);
            SecretKey::random(&mut rng)
        })
        .collect()
}

/// Every other replica's `PeerConfig`, as seen by `own`.
pub fn peers_for(own: ReplicaId, keys: &[SecretKey]) -> Vec<PeerConfig> {
    keys.iter()
        .enumerate()
        .filter(|(i, _)| *i as u16 != own)
        .map(|(i, k)| PeerConfig {
            id: i as ReplicaId,
            addr: addr(9000 + i as u16),
            pubkey: k.public_key(),
        })
        .collect()
}

/// Builds `n` replicas, each with a full view of every other replica's
/// public key, sharing a `FixedPacemaker` naming `proposer` as leader.
pub fn fixed_cluster(n: u16, proposer: ReplicaId) -> (Vec<CoreStateMachine>, Vec<SecretKey>) {
    let keys = keys(n);
    let replicas = (0..n)
        .map(|own| {
            let cfg = Arc::new(ReplicaConfig::new(
                own,
                addr(9000 + own),
                peers_for(own, &keys),
                RuntimeParams::new(Duration::from_millis(50), 8),
            ));
            CoreStateMachine::new(
                own,
                cfg,
                Arc::new(FixedPacemaker::new(proposer)),
                Arc::new(NullDecisionSink),
            )
        })
        .collect();
    (replicas, keys)
}

/// Re-sign a block body with a different key, producing a distinct `Arc<Block>`
/// carrying the same content hash (hashing excludes the signature).
pub fn sign(sk: &SecretKey, blk: &Block) -> Arc<Block> {
    let sig = create_part_cert(sk, blk.hash().as_bytes());
    Block::from_parts(
        blk.proposer,
        blk.height,
        blk.parent_hashes.clone(),
        blk.cmds.clone(),
        blk.extra.clone(),
        Some(sig),
    )
}

/// A `NetworkSink` that records every call instead of touching a socket,
/// for asserting on what a `Reactor` broadcast or requested.
#[derive(Default)]
pub struct RecordingSink {
    pub requested: Mutex<Vec<(Vec<Digest>, ReplicaId)>>,
    pub broadcasted: Mutex<Vec<Arc<Block>>>,
}

#[async_trait]
impl NetworkSink for RecordingSink {
    async fn broadcast(&self, blk: Arc<Block>) {
        self.broadcasted.lock().expect("poisoned").push(blk);
    }
    async fn request_blocks(&self, hashes: Vec<Digest>, from: ReplicaId) {
        self.requested.lock().expect("poisoned").push((hashes, from));
    }
}

/// A `CommandSource` with nothing pending, for reactor tests that only
/// exercise the proposal/fetch path.
pub struct NoCommands;

impl e2c_core::CommandSource for NoCommands {
    fn take_batch(&self, _max: usize) -> Vec<Digest> {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_cluster_shares_pairwise_peer_views() {
        let (replicas, _keys) = fixed_cluster(3, 0);
        assert_eq!(replicas.len(), 3);
        for (i, r) in replicas.iter().enumerate() {
            assert_eq!(r.config().num_replicas(), 3);
            assert!(r.config().peer(i as ReplicaId).is_none());
        }
    }

    #[test]
    fn sign_preserves_hash() {
        let keys = keys(1);
        let blk = Block::seal(0, 1, vec![Digest::ZERO], vec![], bytes::Bytes::new(), None);
        let signed = sign(&keys[0], &blk);
        assert_eq!(blk.hash(), signed.hash());
        assert!(signed.signature.is_some());
    }
}
