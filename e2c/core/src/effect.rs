// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Effects that `CoreStateMachine` asks its caller to perform.
//!
//! `update`, `on_receive_proposal`, and the commit cascade must run to
//! completion without suspending (spec §5) — they are plain synchronous
//! functions. Anything they need that involves real I/O or a scheduled
//! wakeup (broadcasting a proposal, arming/cancelling a timer, asking
//! peers to fetch blocks) is returned as a value here instead of being
//! awaited in place. The reactor (`crate::reactor`) is the only thing that
//! executes these.

use e2c_storage::{Block, BlockHeight};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Effect {
    /// Broadcast a block (as a fresh proposal, or a forward of one just
    /// accepted for the first time) to every peer.
    Broadcast(Arc<Block>),
    /// Arm the one-shot commit timer for `height`, to fire after `after`
    /// (spec §4.4.2: armed exactly once, at first successful insertion).
    ArmCommitTimer { height: BlockHeight, after: Duration },
    /// Cancel the pending commit timer for `height` because it was just
    /// committed by the cascade from a higher height (spec §4.4.5).
    CancelCommitTimer { height: BlockHeight },
}
