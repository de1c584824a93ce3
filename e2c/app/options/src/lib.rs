// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Command-line options for the `e2c-node` binary, parsed with `clap`.

pub mod config;
pub mod key;
pub mod run;

mod log;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use self::{config::ConfigArgs, key::KeyArgs, run::RunArgs};
use log::{parse_log_level, LogLevel};

#[derive(Parser, Debug)]
#[command(version)]
pub struct Options {
    /// Directory for data and configuration files.
    #[arg(short = 'd', long, default_value = "~/.e2c", env = "E2C_HOME_DIR")]
    home_dir: PathBuf,

    /// Override the configuration directory; defaults to `<home_dir>/config`.
    #[arg(long, env = "E2C_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Logging level for the console: a standard level or an `EnvFilter` directive string.
    #[arg(
        short = 'l',
        long,
        default_value = "info",
        value_enum,
        env = "E2C_LOG_LEVEL",
        value_parser = parse_log_level,
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

impl Options {
    pub fn log_filter(&self) -> anyhow::Result<EnvFilter> {
        self.log_level.to_filter()
    }

    /// Directory for data and configuration files, with a leading `~`
    /// expanded to the user's home directory (clap does not do this for
    /// `default_value`, so a default-configured node would otherwise read
    /// and write under a directory literally named `~`).
    pub fn home_dir(&self) -> PathBuf {
        expand_tilde(&self.home_dir)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.config_dir
            .clone()
            .unwrap_or_else(|| self.home_dir().join("config"))
    }
}

/// Expand a leading `~` to `$HOME`. Leaves any other path untouched.
pub fn expand_tilde<P: AsRef<Path>>(path: P) -> PathBuf {
    let p = path.as_ref().to_path_buf();
    if !p.starts_with("~") {
        return p;
    }
    if p == Path::new("~") {
        return dirs::home_dir().unwrap_or(p);
    }
    dirs::home_dir()
        .map(|mut h| {
            if h == Path::new("/") {
                // `~/foo` becomes just `/foo` instead of `//foo` if `/` is home.
                p.strip_prefix("~").unwrap().to_path_buf()
            } else {
                h.push(p.strip_prefix("~/").unwrap());
                h
            }
        })
        .unwrap_or(p)
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the replica and drive the consensus reactor.
    Run(RunArgs),
    /// Subcommands for generating and inspecting signing keys.
    Key(KeyArgs),
    /// Parse the configuration and print it to the console.
    Config(ConfigArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_parses_with_replica_id() {
        let opts = Options::parse_from(["e2c-node", "run", "--replica-id", "2"]);
        match opts.command {
            Commands::Run(args) => assert_eq!(args.replica_id, Some(2)),
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn config_dir_defaults_under_home() {
        let opts = Options::parse_from(["e2c-node", "-d", "/tmp/e2c-home", "config"]);
        assert_eq!(opts.config_dir(), PathBuf::from("/tmp/e2c-home/config"));
    }

    #[test]
    fn log_level_defaults_to_info() {
        let opts = Options::parse_from(["e2c-node", "config"]);
        let filter = opts.log_filter().unwrap();
        assert_eq!(
            filter.max_level_hint(),
            Some(tracing::level_filters::LevelFilter::INFO)
        );
    }

    #[test]
    fn default_home_dir_expands_tilde() {
        let home = std::env::var("HOME").expect("should work on Linux");
        let opts = Options::parse_from(["e2c-node", "config"]);
        assert_eq!(opts.home_dir(), PathBuf::from(format!("{home}/.e2c")));
        assert_eq!(
            opts.config_dir(),
            PathBuf::from(format!("{home}/.e2c/config"))
        );
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = std::env::var("HOME").expect("should work on Linux");
        let home_project = PathBuf::from(format!("{}/.project", home));
        assert_eq!(expand_tilde("~/.project"), home_project);
        assert_eq!(expand_tilde("/foo/bar"), PathBuf::from("/foo/bar"));
        assert_eq!(expand_tilde("~foo/bar"), PathBuf::from("~foo/bar"));
    }
}
