// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Log level parsing: either a standard level or a raw `EnvFilter` directive
//! string, so `--log-level debug` and `--log-level e2c_net=debug,info` both work.

use clap::builder::PossibleValue;
use clap::ValueEnum;
use lazy_static::lazy_static;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    Filter(String),
}

impl LogLevel {
    pub fn as_str(&self) -> &str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
            LogLevel::Filter(s) => s.as_str(),
        }
    }

    pub fn to_filter(&self) -> anyhow::Result<EnvFilter> {
        Ok(EnvFilter::try_new(self.as_str())?)
    }
}

impl ValueEnum for LogLevel {
    fn value_variants<'a>() -> &'a [Self] {
        lazy_static! {
            static ref VARIANTS: Vec<LogLevel> = vec![
                LogLevel::Off,
                LogLevel::Error,
                LogLevel::Warn,
                LogLevel::Info,
                LogLevel::Debug,
                LogLevel::Trace,
            ];
        }
        &VARIANTS
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        match self {
            LogLevel::Filter(_) => None,
            other => Some(PossibleValue::new(other.as_str().to_string())),
        }
    }
}

pub fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    if let Ok(lvl) = ValueEnum::from_str(s, true) {
        return Ok(lvl);
    }
    if let Err(e) = EnvFilter::try_new(s) {
        Err(e.to_string())
    } else {
        Ok(LogLevel::Filter(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_level_parses() {
        let lvl = parse_log_level("debug").unwrap();
        assert_eq!(lvl.as_str(), "debug");
    }

    #[test]
    fn filter_string_parses() {
        let lvl = parse_log_level("e2c_net=warn,info").unwrap();
        assert!(lvl.to_filter().is_ok());
    }

    #[test]
    fn garbage_filter_is_rejected() {
        assert!(parse_log_level("e2c_net=not_a_level").is_err());
    }
}
