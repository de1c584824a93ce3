// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Length-prefixed framing for `Message` over a `tokio::net::TcpStream`,
//! via `tokio_util::codec`'s `LengthDelimitedCodec` plus an encode/decode
//! layer translating to and from `wire::Message`.

use crate::wire::Message;
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Adapts `LengthDelimitedCodec` (u32 length prefix, matching the rest of
/// this protocol's little-endian framing) to decode/encode `Message`
/// values directly, so a binding can `Framed::new(stream, MessageCodec::default())`
/// and work with messages instead of raw frames.
pub struct MessageCodec {
    inner: LengthDelimitedCodec,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .little_endian()
                .length_field_length(4)
                .new_codec(),
        }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(frame) => Ok(Some(Message::decode(frame.freeze())?)),
            None => Ok(None),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes: Bytes = item.encode();
        self.inner.encode(bytes, dst)?;
        Ok(())
    }
}
