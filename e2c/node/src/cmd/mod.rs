// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! CLI command implementations.

use anyhow::{anyhow, Context};
use std::path::PathBuf;

use crate::options::{Commands, Options};
use crate::settings::Settings;

pub mod config;
pub mod key;
pub mod run;

/// Execute the command specified in the options.
pub async fn exec(opts: &Options) -> anyhow::Result<()> {
    match &opts.command {
        Commands::Config(args) => config::exec(args, settings(opts)?).await,
        Commands::Run(args) => run::exec(args, settings(opts)?).await,
        Commands::Key(args) => key::exec(args).await,
    }
}

/// Load settings from the configuration directory named in `opts`.
fn settings(opts: &Options) -> anyhow::Result<Settings> {
    let config_dir: PathBuf = opts.config_dir();
    if !config_dir.is_dir() {
        return Err(anyhow!(
            "'{}' does not exist or is not a directory",
            config_dir.display()
        ));
    }
    Settings::new(&config_dir, &opts.home_dir()).context("failed to parse settings")
}
