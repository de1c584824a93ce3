// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Subcommands for generating and inspecting replica signing keys.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct KeyArgs {
    #[command(subcommand)]
    pub command: KeyCommands,
}

#[derive(Subcommand, Debug)]
pub enum KeyCommands {
    /// Generate a new Secp256k1 keypair and export it as base64 files.
    Gen(KeyGenArgs),
    /// Print the base64-encoded public key derived from a secret key file.
    Show(KeyShowArgs),
}

#[derive(Args, Debug)]
pub struct KeyGenArgs {
    /// Name used to distinguish the exported key files.
    #[arg(long, short)]
    pub name: String,
    /// Directory to export the key files to; it must exist.
    #[arg(long, short, default_value = ".")]
    pub out_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct KeyShowArgs {
    /// Path to the base64-encoded secret key file.
    #[arg(long, short)]
    pub secret_key: PathBuf,
}
