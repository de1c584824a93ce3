// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Flat event structs for `e2c_tracing::emit!`, mirrored per command/decision
//! lifecycle stage rather than per log line.

/// Hex-encoded digest, the same shape `Digest`'s `Display` impl produces.
pub type DigestHex<'a> = &'a str;

#[derive(Debug, Default)]
pub struct CommandSubmitted<'a> {
    pub cmd_hash: DigestHex<'a>,
}

#[derive(Debug, Default)]
pub struct CommandDecided<'a> {
    pub cmd_hash: DigestHex<'a>,
    pub blk_hash: DigestHex<'a>,
    pub cmd_height: u32,
}

#[derive(Debug, Default)]
pub struct DecisionDropped<'a> {
    pub cmd_hash: DigestHex<'a>,
}
