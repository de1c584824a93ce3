// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Composition root: turns a loaded `Settings` into a running replica.

use std::fs;
use std::sync::Arc;

use anyhow::Context;
use e2c_app::AppShell;
use e2c_core::{CoreStateMachine, Reactor, ReactorEvent, RoundRobinPacemaker};
use e2c_crypto::{from_b64, SecretKey};
use e2c_net::{NetworkBinding, PooledVerifier};
use tokio::sync::mpsc;

use crate::options::run::RunArgs;
use crate::settings::Settings;

/// Read and decode the replica's signing key from `path`.
fn load_signing_key(path: &std::path::Path) -> anyhow::Result<SecretKey> {
    let b64 = fs::read_to_string(path)
        .with_context(|| format!("reading signing key from '{}'", path.display()))?;
    let bz = from_b64(b64.trim()).context("decoding signing key")?;
    SecretKey::try_from(bz).map_err(|e| anyhow::anyhow!("parsing signing key: {e}"))
}

pub async fn exec(args: &RunArgs, mut settings: Settings) -> anyhow::Result<()> {
    if let Some(id) = args.replica_id {
        settings.replica_id = id;
    }

    let own_id = settings.replica_id;
    let num_replicas = settings.num_replicas();
    let initial_proposer = settings.initial_proposer;
    let key_path = settings.key_file_path();

    let signing_key = load_signing_key(&key_path)?;
    let config = Arc::new(settings.replica_config()?);

    tracing::info!(
        replica_id = own_id,
        num_replicas,
        listen = %config.listen,
        "starting replica"
    );

    let pacemaker = Arc::new(RoundRobinPacemaker::new(num_replicas, initial_proposer));

    let (notify_tx, mut notify_rx) = mpsc::channel::<()>(64);
    let app = Arc::new(AppShell::new(notify_tx));

    let core = CoreStateMachine::new(own_id, config.clone(), pacemaker, app.clone());

    let (events_tx, events_rx) = mpsc::channel::<ReactorEvent>(1024);

    // AppShell only has a `()` notify channel (it doesn't know about
    // `ReactorEvent`, which lives in e2c-core below e2c-app in the
    // dependency graph), so forward its wakeups into the reactor's event
    // channel here.
    let forward_tx = events_tx.clone();
    tokio::spawn(async move {
        while notify_rx.recv().await.is_some() {
            if forward_tx.send(ReactorEvent::CommandSubmitted).await.is_err() {
                break;
            }
        }
    });

    let verifier = Arc::new(PooledVerifier);
    let binding = NetworkBinding::new(own_id, config, verifier.clone(), events_tx);
    tokio::spawn(binding.clone().listen());

    let mut reactor = Reactor::new(core, binding, verifier, app, signing_key, events_rx);
    reactor.run().await;

    Ok(())
}
