// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! `ChainView`: the per-replica view of the chain (spec §3) — `b_mark`,
//! `b_comm`, `tails`, and the height -> block map.

use e2c_storage::{genesis_block, Block, BlockHeight, Digest};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Per-replica view of the chain: the highest delivered block (`b_mark`),
/// the highest committed block (`b_comm`), the set of childless delivered
/// blocks (`tails`), and the height -> accepted-block partial function
/// (`ht_blk_map`). See spec §3 invariants 1-6.
pub struct ChainView {
    pub genesis: Arc<Block>,
    pub b_mark: Arc<Block>,
    pub b_comm: Arc<Block>,
    pub tails: HashSet<Digest>,
    pub ht_blk_map: BTreeMap<BlockHeight, Arc<Block>>,
}

impl ChainView {
    /// The genesis-seeded view: genesis occupies height 0 in `ht_blk_map`
    /// (spec §3 "Genesis occupies height 0"), is its own tail, and is both
    /// `b_mark` and `b_comm` until a real block is delivered/committed.
    pub fn genesis_view() -> Self {
        let genesis = genesis_block();
        let mut ht_blk_map = BTreeMap::new();
        ht_blk_map.insert(0, genesis.clone());
        let mut tails = HashSet::new();
        tails.insert(genesis.hash());
        Self {
            b_mark: genesis.clone(),
            b_comm: genesis.clone(),
            tails,
            ht_blk_map,
            genesis,
        }
    }

    /// Parent selection for a new proposal (spec §4.4.3): walk `ht_blk_map`
    /// from `b_mark.height` down to 1, appending each mapped block in
    /// descending height order, terminating with genesis. Index 0 of the
    /// result is the direct parent.
    pub fn compose_parents(&self) -> Vec<Arc<Block>> {
        let mut parents = Vec::new();
        let mut h = self.b_mark.height;
        while h >= 1 {
            if let Some(blk) = self.ht_blk_map.get(&h) {
                parents.push(blk.clone());
            }
            h -= 1;
        }
        parents.push(self.genesis.clone());
        parents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_view_seeds_height_zero() {
        let view = ChainView::genesis_view();
        assert_eq!(view.ht_blk_map.get(&0).unwrap().hash(), view.genesis.hash());
        assert_eq!(view.b_mark.height, 0);
        assert_eq!(view.b_comm.height, 0);
        assert!(view.tails.contains(&view.genesis.hash()));
    }

    #[test]
    fn compose_parents_is_genesis_only_at_height_zero() {
        let view = ChainView::genesis_view();
        let parents = view.compose_parents();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].hash(), view.genesis.hash());
    }
}
