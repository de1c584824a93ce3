// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The immutable, content-addressed block: a proposal unit carrying
//! parent references, a batch of command hashes, and a single proposer
//! signature.

use crate::digest::Digest;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use e2c_crypto::PartCert;
use std::sync::Arc;

/// Small-integer replica identifier (spec §3: "replica identifier, small integer").
///
/// `u16` because the `Finality` wire format carries `rid` as `uint16` (spec §6);
/// block proposer is widened to `u32` on the wire to leave header room, per
/// the block wire format in spec §6.
pub type ReplicaId = u16;

/// 0 = genesis; height of a child is `height(parent[0]) + 1`.
pub type BlockHeight = u32;

/// An immutable, content-addressed block.
///
/// Equality and hashing are defined purely in terms of the canonical wire
/// encoding of `(proposer, height, parent_hashes, cmds, extra)` — the
/// `signature` and cached `hash` are not part of identity, matching the
/// spec's "runtime attributes are not part of the hash" rule.
#[derive(Debug, Clone)]
pub struct Block {
    pub proposer: ReplicaId,
    pub height: BlockHeight,
    /// Index 0 is the direct parent (used for height); the rest are
    /// ancestor references the proposer wants receivers to fetch.
    pub parent_hashes: Vec<Digest>,
    pub cmds: Vec<Digest>,
    pub extra: Bytes,
    /// `None` only for genesis; every proposed block is signed by its proposer.
    pub signature: Option<PartCert>,
    hash: Digest,
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}
impl Eq for Block {}

impl Block {
    /// Construct and seal a new block, computing its canonical hash.
    ///
    /// `parent_hashes` must be non-empty for anything but genesis (spec
    /// §4.4.3 precondition); this constructor does not enforce that itself
    /// since it is also used to build the genesis block — callers in
    /// `e2c-core` enforce the precondition before calling it.
    pub fn seal(
        proposer: ReplicaId,
        height: BlockHeight,
        parent_hashes: Vec<Digest>,
        cmds: Vec<Digest>,
        extra: Bytes,
        signature: Option<PartCert>,
    ) -> Arc<Block> {
        let mut blk = Block {
            proposer,
            height,
            parent_hashes,
            cmds,
            extra,
            signature,
            hash: Digest::ZERO,
        };
        blk.hash = Digest::hash(&blk.canonical_bytes());
        Arc::new(blk)
    }

    pub fn hash(&self) -> Digest {
        self.hash
    }

    pub fn direct_parent(&self) -> Option<Digest> {
        self.parent_hashes.first().copied()
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    /// Canonical little-endian wire encoding, per spec §6:
    /// `proposer:u32, height:u32, parent_count:u32, parents.., cmd_count:u32,
    /// cmds.., extra_len:u32, extra`. The block hash is the digest of this
    /// encoding; it excludes the trailing signature, which travels alongside
    /// the block in a `Propose` message rather than inside it.
    pub fn canonical_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            4 + 4 + 4 + self.parent_hashes.len() * 32 + 4 + self.cmds.len() * 32
                + 4
                + self.extra.len(),
        );
        buf.put_u32_le(self.proposer as u32);
        buf.put_u32_le(self.height);
        buf.put_u32_le(self.parent_hashes.len() as u32);
        for h in &self.parent_hashes {
            buf.put_slice(h.as_bytes());
        }
        buf.put_u32_le(self.cmds.len() as u32);
        for c in &self.cmds {
            buf.put_slice(c.as_bytes());
        }
        buf.put_u32_le(self.extra.len() as u32);
        buf.put_slice(&self.extra);
        buf.freeze()
    }

    /// Decode a block body from its canonical encoding. The signature is
    /// not part of the body; callers attach it separately (it travels next
    /// to the block in the `Propose` message, per spec §6).
    pub fn decode_body(mut bz: Bytes) -> anyhow::Result<(ReplicaId, BlockHeight, Vec<Digest>, Vec<Digest>, Bytes)> {
        if bz.len() < 12 {
            anyhow::bail!("block body too short");
        }
        let proposer = bz.get_u32_le();
        if proposer > u16::MAX as u32 {
            anyhow::bail!("proposer id {proposer} out of range");
        }
        let height = bz.get_u32_le();

        let parent_count = bz.get_u32_le() as usize;
        let mut parent_hashes = Vec::with_capacity(parent_count);
        for _ in 0..parent_count {
            if bz.remaining() < 32 {
                anyhow::bail!("truncated parent hash");
            }
            let mut h = [0u8; 32];
            bz.copy_to_slice(&mut h);
            parent_hashes.push(Digest(h));
        }

        if bz.remaining() < 4 {
            anyhow::bail!("truncated cmd count");
        }
        let cmd_count = bz.get_u32_le() as usize;
        let mut cmds = Vec::with_capacity(cmd_count);
        for _ in 0..cmd_count {
            if bz.remaining() < 32 {
                anyhow::bail!("truncated cmd hash");
            }
            let mut h = [0u8; 32];
            bz.copy_to_slice(&mut h);
            cmds.push(Digest(h));
        }

        if bz.remaining() < 4 {
            anyhow::bail!("truncated extra length");
        }
        let extra_len = bz.get_u32_le() as usize;
        if bz.remaining() < extra_len {
            anyhow::bail!("truncated extra payload");
        }
        let extra = bz.copy_to_bytes(extra_len);

        Ok((proposer as ReplicaId, height, parent_hashes, cmds, extra))
    }

    /// Rebuild a sealed block from a decoded body plus its signature.
    pub fn from_parts(
        proposer: ReplicaId,
        height: BlockHeight,
        parent_hashes: Vec<Digest>,
        cmds: Vec<Digest>,
        extra: Bytes,
        signature: Option<PartCert>,
    ) -> Arc<Block> {
        Block::seal(proposer, height, parent_hashes, cmds, extra, signature)
    }
}

/// The singleton height-0 block: pre-delivered, pre-committed, terminating
/// every ancestor chain (spec §3 "Genesis").
pub fn genesis_block() -> Arc<Block> {
    Block::seal(0, 0, vec![], vec![], Bytes::from_static(b"e2c-genesis"), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_roundtrip_preserves_hash() {
        let blk = Block::seal(
            3,
            1,
            vec![Digest::hash(b"parent")],
            vec![Digest::hash(b"cmd0"), Digest::hash(b"cmd1")],
            Bytes::from_static(b"extra-bytes"),
            None,
        );
        let bytes = blk.canonical_bytes();
        let (proposer, height, parents, cmds, extra) = Block::decode_body(bytes).unwrap();
        let rebuilt = Block::from_parts(proposer, height, parents, cmds, extra, None);
        assert_eq!(blk.hash(), rebuilt.hash());
    }

    #[test]
    fn genesis_is_deterministic() {
        assert_eq!(genesis_block().hash(), genesis_block().hash());
    }

    #[test]
    fn different_cmds_change_hash() {
        let a = Block::seal(1, 1, vec![Digest::ZERO], vec![Digest::hash(b"a")], Bytes::new(), None);
        let b = Block::seal(1, 1, vec![Digest::ZERO], vec![Digest::hash(b"b")], Bytes::new(), None);
        assert_ne!(a.hash(), b.hash());
    }
}
