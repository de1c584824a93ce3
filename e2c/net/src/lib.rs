// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The TCP network binding: wire codec, per-peer connection management,
//! and a pooled `Verifier` dispatching signature checks off the reactor
//! thread.

pub mod binding;
pub mod codec;
pub mod verifier;
pub mod wire;

pub use binding::NetworkBinding;
pub use codec::MessageCodec;
pub use verifier::PooledVerifier;
pub use wire::Message;
