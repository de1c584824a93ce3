// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Error kinds named in spec §7. Network-originated variants are absorbed
//! at the `e2c-net` binding boundary (dropped message + log/metric); they
//! never unwind through the core. Internal precondition violations are
//! `assert!`/`debug_assert!`, not `CoreError`, per spec §7.

use e2c_storage::{BlockHeight, Digest, ReplicaId};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A parent hash does not resolve to a delivered block (spec §4.4.1).
    #[error("block references undelivered parent {0}")]
    NotDelivered(Digest),

    /// A remote proposal's signature failed to verify against the proposer's
    /// configured public key (spec §4.2, §4.4.4 step 4).
    #[error("bad signature from proposer {0}")]
    BadSignature(ReplicaId),

    /// A proposal arrived from a replica that is not the pacemaker's current
    /// proposer (spec §4.4.4 step 2).
    #[error("proposal from non-leader {proposer}, expected {expected}")]
    WrongProposer {
        proposer: ReplicaId,
        expected: ReplicaId,
    },

    /// Two distinct blocks were accepted at the same height (spec §4.4.2).
    /// The existing (already height-mapped) block is kept; the incoming one
    /// is dropped and never committed.
    #[error("equivocation at height {height}: existing {existing}, incoming {incoming}")]
    Equivocation {
        height: BlockHeight,
        existing: Digest,
        incoming: Digest,
    },

    /// An unresolved block/command fetch timed out; recoverable by re-issuing
    /// the request with jitter (spec §4.4.7).
    #[error("fetch timed out for {0} entities")]
    FetchTimeout(usize),

    /// A decoded message violated the wire format (spec §6); the binding
    /// closes the connection on this error, it is not silently dropped.
    #[error("serialization error: {0}")]
    SerializationError(String),
}
