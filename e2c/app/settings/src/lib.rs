// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! TOML + environment variable configuration for a replica, following the
//! layered `config`-crate settings pattern: a checked-in `default.toml`,
//! an optional `local.toml` override, then `E2C_`-prefixed environment
//! variables, deserialized into a typed `Settings`.
//!
//! Unlike the teacher's settings crate, there is no `EnvInterpol` source
//! (regex-based `${VAR}` interpolation inside TOML values) and no
//! mode-specific override file (`dev.toml`/`test.toml`) — this replica has
//! one configuration shape and no per-environment variants worth a third
//! settings tier, so that machinery is dropped rather than carried as dead
//! weight.

use anyhow::Context;
use config::{Config, ConfigError, Environment, File};
use e2c_core::{PeerConfig, ReplicaConfig, RuntimeParams};
use e2c_crypto::{from_b64, PublicKey};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One peer entry as it appears in the TOML file: the public key travels
/// as base64 text, matching `e2c_crypto::to_b64`/`from_b64`.
#[derive(Debug, Deserialize, Clone)]
pub struct PeerSettings {
    pub id: u16,
    pub addr: SocketAddr,
    pub pubkey_b64: String,
}

impl PeerSettings {
    fn into_peer_config(self) -> anyhow::Result<PeerConfig> {
        let bz = from_b64(&self.pubkey_b64).context("decoding peer public key")?;
        let pubkey = PublicKey::parse_slice(&bz, None).context("parsing peer public key")?;
        Ok(PeerConfig {
            id: self.id,
            addr: self.addr,
            pubkey,
        })
    }
}

/// Runtime parameters as they appear in the TOML file, all in milliseconds
/// for readability (`ReplicaConfig` itself stores `Duration`s).
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeSettings {
    pub delta_ms: u64,
    pub block_size: usize,
    #[serde(default = "default_entity_wait_ms")]
    pub entity_wait_timeout_ms: u64,
    #[serde(default)]
    pub retain_window: Option<u32>,
}

fn default_entity_wait_ms() -> u64 {
    10_000
}

impl RuntimeSettings {
    fn into_params(self) -> RuntimeParams {
        let mut params = RuntimeParams::new(
            Duration::from_millis(self.delta_ms),
            self.block_size,
        );
        params.entity_wait_timeout = Duration::from_millis(self.entity_wait_timeout_ms);
        params.retain_window = self.retain_window;
        params
    }
}

/// The full replica configuration as loaded from disk/environment.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(skip)]
    home_dir: PathBuf,
    pub replica_id: u16,
    pub listen: SocketAddr,
    #[serde(default)]
    pub peers: Vec<PeerSettings>,
    pub runtime: RuntimeSettings,
    /// The proposer a freshly started cluster begins with; the pacemaker
    /// rotates away from this on impeachment/commit, it is not re-read.
    #[serde(default)]
    pub initial_proposer: u16,
    /// Path to this replica's base64-encoded secret key, relative to
    /// `home_dir` unless absolute.
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
}

fn default_key_file() -> PathBuf {
    PathBuf::from("validator.sk")
}

impl Settings {
    /// Load `<config_dir>/default.toml`, then an optional `<config_dir>/local.toml`
    /// override, then `E2C_`-prefixed environment variables (e.g.
    /// `E2C_RUNTIME__DELTA_MS=50`), and deserialize the result.
    pub fn new(config_dir: &Path, home_dir: &Path) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(config_dir.join("default")))
            .add_source(File::from(config_dir.join("local")).required(false))
            .add_source(
                Environment::with_prefix("e2c")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        let mut settings: Settings = config.try_deserialize()?;
        settings.home_dir = home_dir.to_path_buf();
        Ok(settings)
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// Absolute path to the signing key file, resolving `key_file` against
    /// `home_dir` when it is relative.
    pub fn key_file_path(&self) -> PathBuf {
        if self.key_file.is_absolute() {
            self.key_file.clone()
        } else {
            self.home_dir.join(&self.key_file)
        }
    }

    pub fn num_replicas(&self) -> u16 {
        self.peers.len() as u16 + 1
    }

    /// Build the `e2c-core` `ReplicaConfig` this settings layer describes.
    pub fn replica_config(self) -> anyhow::Result<ReplicaConfig> {
        let peers = self
            .peers
            .into_iter()
            .map(PeerSettings::into_peer_config)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(ReplicaConfig::new(
            self.replica_id,
            self.listen,
            peers,
            self.runtime.into_params(),
        ))
    }
}
