// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! `ReplicaConfig`: the identity -> public-key / peer-id map and the
//! synchrony/batching runtime parameters (spec §3, §6).

use e2c_crypto::PublicKey;
use e2c_storage::{BlockHeight, ReplicaId};
use std::net::SocketAddr;
use std::time::Duration;

/// Static description of one peer in the replica set.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub id: ReplicaId,
    pub addr: SocketAddr,
    pub pubkey: PublicKey,
}

/// The Δ-driven runtime parameters named in spec §6.
#[derive(Debug, Clone)]
pub struct RuntimeParams {
    /// Δ: assumed upper bound on message delay between honest replicas.
    pub delta: Duration,
    /// B: number of commands the leader batches per proposal.
    pub block_size: usize,
    /// How long an unresolved block/command fetch waits before retrying (default 10s).
    pub entity_wait_timeout: Duration,
    /// App-layer impeachment timeout (default 2Δ); not enforced by the core itself,
    /// it only provides `delta` so a caller can derive it.
    pub impeach_timeout: Duration,
    /// Number of heights of committed history a block may be dropped after
    /// (spec §4.1 release policy, expanded in spec §4.1.1). `None` keeps
    /// everything in memory, which is the default — this is an in-memory
    /// cache, not a pruned store (spec §1 Non-goals).
    pub retain_window: Option<BlockHeight>,
}

impl RuntimeParams {
    pub fn new(delta: Duration, block_size: usize) -> Self {
        Self {
            delta,
            block_size,
            entity_wait_timeout: Duration::from_secs(10),
            impeach_timeout: delta * 2,
            retain_window: None,
        }
    }

    /// The commit timer duration: 2Δ (spec §1, §4.4.2).
    pub fn commit_delay(&self) -> Duration {
        self.delta * 2
    }
}

/// Identity -> public-key / peer-id map and quorum/runtime parameters for one replica
/// (spec §2 component table, §6 "Replica configuration").
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    pub replica_id: ReplicaId,
    pub listen: SocketAddr,
    pub peers: Vec<PeerConfig>,
    pub params: RuntimeParams,
}

impl ReplicaConfig {
    pub fn new(
        replica_id: ReplicaId,
        listen: SocketAddr,
        peers: Vec<PeerConfig>,
        params: RuntimeParams,
    ) -> Self {
        Self {
            replica_id,
            listen,
            peers,
            params,
        }
    }

    /// Total number of replicas, including this one, in the configured set.
    pub fn num_replicas(&self) -> u16 {
        self.peers.len() as u16 + 1
    }

    /// Public key of a given replica, `None` if it isn't `self` and isn't a known peer.
    pub fn pubkey(&self, id: ReplicaId) -> Option<PublicKey> {
        self.peers.iter().find(|p| p.id == id).map(|p| p.pubkey)
    }

    pub fn peer(&self, id: ReplicaId) -> Option<&PeerConfig> {
        self.peers.iter().find(|p| p.id == id)
    }

    pub fn all_peer_ids(&self) -> Vec<ReplicaId> {
        self.peers.iter().map(|p| p.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use e2c_crypto::SecretKey;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn commit_delay_is_2delta() {
        let params = RuntimeParams::new(Duration::from_millis(100), 1);
        assert_eq!(params.commit_delay(), Duration::from_millis(200));
    }

    #[test]
    fn num_replicas_counts_self() {
        let mut rng = ChaCha20Rng::from_seed([1u8; 32]);
        let peers = vec![
            PeerConfig {
                id: 1,
                addr: addr(9001),
                pubkey: SecretKey::random(&mut rng).public_key(),
            },
            PeerConfig {
                id: 2,
                addr: addr(9002),
                pubkey: SecretKey::random(&mut rng).public_key(),
            },
        ];
        let cfg = ReplicaConfig::new(
            0,
            addr(9000),
            peers,
            RuntimeParams::new(Duration::from_millis(100), 1),
        );
        assert_eq!(cfg.num_replicas(), 3);
        assert!(cfg.pubkey(0).is_none());
        assert!(cfg.pubkey(1).is_some());
    }
}
