// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Content-addressed storage for blocks and commands: the `Block` type,
//! its `Digest` addressing scheme, and the `EntityStorage` cache that
//! backs the block-fetch protocol's delivery tracking.

mod block;
mod digest;
mod storage;

pub use block::{genesis_block, Block, BlockHeight, ReplicaId};
pub use digest::Digest;
pub use storage::EntityStorage;
