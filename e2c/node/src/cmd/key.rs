// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Generate and inspect replica signing keys.

use std::fs;

use anyhow::Context;
use e2c_crypto::{from_b64, to_b64, SecretKey};
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::options::key::{KeyArgs, KeyCommands, KeyGenArgs, KeyShowArgs};

pub async fn exec(args: &KeyArgs) -> anyhow::Result<()> {
    match &args.command {
        KeyCommands::Gen(args) => gen(args),
        KeyCommands::Show(args) => show(args),
    }
}

/// Export `<out_dir>/<name>.sk` and `<out_dir>/<name>.pk`, both base64.
fn gen(args: &KeyGenArgs) -> anyhow::Result<()> {
    if !args.out_dir.is_dir() {
        anyhow::bail!("'{}' does not exist or is not a directory", args.out_dir.display());
    }

    let mut rng = ChaCha20Rng::from_entropy();
    let sk = SecretKey::random(&mut rng);
    let pk = sk.public_key();

    let sk_path = args.out_dir.join(format!("{}.sk", args.name));
    let pk_path = args.out_dir.join(format!("{}.pk", args.name));

    fs::write(&sk_path, to_b64(sk.serialize().as_ref()))
        .with_context(|| format!("writing '{}'", sk_path.display()))?;
    fs::write(&pk_path, to_b64(&pk.serialize()))
        .with_context(|| format!("writing '{}'", pk_path.display()))?;

    tracing::info!(sk = %sk_path.display(), pk = %pk_path.display(), "exported key pair");
    println!("{}", pk_path.display());
    Ok(())
}

fn show(args: &KeyShowArgs) -> anyhow::Result<()> {
    let b64 = fs::read_to_string(&args.secret_key)
        .with_context(|| format!("reading '{}'", args.secret_key.display()))?;
    let bz = from_b64(b64.trim()).context("decoding secret key")?;
    let sk = SecretKey::try_from(bz).map_err(|e| anyhow::anyhow!("parsing secret key: {e}"))?;
    println!("{}", to_b64(&sk.public_key().serialize()));
    Ok(())
}
