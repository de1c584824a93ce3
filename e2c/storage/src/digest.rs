// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The 32-byte content digest used to address blocks and commands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte BLAKE2b digest, used both as a block hash and a command hash.
///
/// Unlike the teacher's `Cid`/multihash stack (which addresses arbitrary
/// IPLD DAG nodes), this system has exactly two kinds of content — blocks
/// and opaque command payloads — so a flat fixed-size digest is enough.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub const ZERO: Digest = Digest([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(bz: &[u8]) -> anyhow::Result<Self> {
        if bz.len() != 32 {
            anyhow::bail!("digest must be 32 bytes, got {}", bz.len());
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(bz);
        Ok(Digest(out))
    }

    /// Hash arbitrary bytes into a content digest.
    pub fn hash(bz: &[u8]) -> Self {
        let h = blake2b_simd::Params::new().hash_length(32).hash(bz);
        Digest::from_slice(h.as_bytes()).expect("blake2b with hash_length(32) produces 32 bytes")
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
