// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Parse the settings layer and print it, for debugging a deployment's
//! configuration without starting a replica.

use crate::options::config::ConfigArgs;
use crate::settings::Settings;

pub async fn exec(_args: &ConfigArgs, settings: Settings) -> anyhow::Result<()> {
    println!("{settings:#?}");
    Ok(())
}
