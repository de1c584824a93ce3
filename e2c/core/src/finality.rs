// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The `Finality` decision record (spec §4.4.5, §6, GLOSSARY).

use e2c_storage::{BlockHeight, Digest, ReplicaId};

/// One command's commit decision, emitted in `cmd_idx` order within a block
/// and in ascending block-height order across blocks (spec §5 ordering
/// guarantees).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finality {
    pub rid: ReplicaId,
    /// `1` = committed. The wire format (spec §6) allows other values in
    /// principle, but the core only ever produces `1` — there is no
    /// "rejected" outcome in this protocol, only "not yet decided".
    pub decision: i8,
    pub cmd_idx: u32,
    pub cmd_height: BlockHeight,
    pub cmd_hash: Digest,
    pub blk_hash: Digest,
}

impl Finality {
    pub fn committed(
        rid: ReplicaId,
        cmd_idx: u32,
        cmd_height: BlockHeight,
        cmd_hash: Digest,
        blk_hash: Digest,
    ) -> Self {
        Self {
            rid,
            decision: 1,
            cmd_idx,
            cmd_height,
            cmd_hash,
            blk_hash,
        }
    }
}
