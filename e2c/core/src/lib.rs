// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The consensus core: block delivery, equivocation detection, commit
//! timers, the commit cascade, and the single-threaded reactor that drives
//! them. See each module for the operation it implements.

pub mod chain;
pub mod config;
pub mod consensus;
pub mod decision;
pub mod effect;
pub mod error;
pub mod finality;
pub mod pacemaker;
pub mod reactor;
pub mod verifier;

pub use chain::ChainView;
pub use config::{PeerConfig, ReplicaConfig, RuntimeParams};
pub use consensus::CoreStateMachine;
pub use decision::{DecisionSink, NullDecisionSink};
pub use effect::Effect;
pub use error::CoreError;
pub use finality::Finality;
pub use pacemaker::{is_leader, FixedPacemaker, Pacemaker, RoundRobinPacemaker};
pub use reactor::{CommandSource, NetworkSink, Reactor, ReactorEvent};
pub use verifier::{InlineVerifier, Verifier};

pub use e2c_storage::{genesis_block, Block, BlockHeight, Digest, EntityStorage, ReplicaId};
