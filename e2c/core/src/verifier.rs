// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Signature verification as a narrow, swappable capability (spec §4.2).
//! `CoreStateMachine` itself never verifies a signature: the reactor
//! verifies before calling `on_receive_proposal`, so that verification (CPU
//! work that MAY be dispatched to a worker pool, per spec §4.2) never
//! blocks the single-threaded reactor (spec §5).

use async_trait::async_trait;
use e2c_crypto::PublicKey;
use e2c_storage::Block;

#[async_trait]
pub trait Verifier: Send + Sync {
    /// Verify `blk`'s signature against the proposer's public key. Genesis
    /// is trivially valid (spec §4.2); any other unsigned block is not.
    async fn verify(&self, blk: &Block, pubkey: &PublicKey) -> bool;
}

/// Verifies inline on the calling task. Correct but blocking; a binding
/// that wants to keep the reactor free during signature checks should wrap
/// this in a worker-pool dispatcher instead (spec §4.2.1 expansion) — see
/// `e2c_net::verifier::PooledVerifier`.
#[derive(Default)]
pub struct InlineVerifier;

#[async_trait]
impl Verifier for InlineVerifier {
    async fn verify(&self, blk: &Block, pubkey: &PublicKey) -> bool {
        match &blk.signature {
            Some(cert) => e2c_crypto::verify(cert, blk.hash().as_bytes(), pubkey),
            None => blk.is_genesis(),
        }
    }
}
