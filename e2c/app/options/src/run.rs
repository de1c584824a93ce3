// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Arguments for `Commands::Run`: start a replica and drive the reactor.

use clap::Args;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Replica identifier; must match an entry in the configured peer set.
    #[arg(long)]
    pub replica_id: Option<u16>,
}
