// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! A `Verifier` that dispatches signature checks to the blocking thread
//! pool, so the single-threaded reactor never stalls on libsecp256k1 math.

use async_trait::async_trait;
use e2c_core::Verifier;
use e2c_crypto::PublicKey;
use e2c_storage::Block;

/// Runs `e2c_crypto::verify` on `tokio::task::spawn_blocking`. Signature
/// checks are CPU-bound and independent of each other, so a bounded number
/// of them can run off the reactor thread concurrently; `spawn_blocking`'s
/// own pool provides that bound without `e2c-net` managing one itself.
#[derive(Default)]
pub struct PooledVerifier;

#[async_trait]
impl Verifier for PooledVerifier {
    async fn verify(&self, blk: &Block, pubkey: &PublicKey) -> bool {
        let Some(cert) = blk.signature else {
            return blk.is_genesis();
        };
        let hash = *blk.hash().as_bytes();
        let pubkey = *pubkey;
        tokio::task::spawn_blocking(move || e2c_crypto::verify(&cert, &hash, &pubkey))
            .await
            .unwrap_or(false)
    }
}
