// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The replica-to-replica wire protocol: opcode-tagged messages carrying
//! blocks, block-fetch requests/responses, and command fetch/finality
//! exchange. Hand-rolled over `bytes::{Buf, BufMut}`, matching the
//! canonical little-endian block encoding `e2c_storage::Block` already
//! uses for its content hash.

use anyhow::bail;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use e2c_core::Finality;
use e2c_crypto::PartCert;
use e2c_storage::{Block, BlockHeight, Digest, ReplicaId};
use std::sync::Arc;

const OP_PROPOSE: u8 = 0x00;
const OP_REQ_BLOCK: u8 = 0x02;
const OP_RESP_BLOCK: u8 = 0x03;
const OP_REQ_CMD: u8 = 0x04;
const OP_RESP_CMD: u8 = 0x05;

/// One message exchanged between replicas, per the message set in the
/// external-interfaces section.
#[derive(Debug, Clone)]
pub enum Message {
    /// `Block ‖ Signature`.
    Propose(Arc<Block>),
    /// `uint32 count ‖ count×hash`.
    ReqBlock(Vec<Digest>),
    /// `uint32 count ‖ count × Block`.
    RespBlock(Vec<Arc<Block>>),
    /// Raw command payload a peer is asking this replica to forward.
    ReqCmd(Bytes),
    /// `Finality ‖ optional fixed-size payload`.
    RespCmd(Finality, Option<Bytes>),
}

fn put_digest(buf: &mut BytesMut, d: &Digest) {
    buf.put_slice(d.as_bytes());
}

fn get_digest(bz: &mut Bytes) -> anyhow::Result<Digest> {
    if bz.remaining() < 32 {
        bail!("truncated digest");
    }
    let mut h = [0u8; 32];
    bz.copy_to_slice(&mut h);
    Ok(Digest(h))
}

fn put_signed_block(buf: &mut BytesMut, blk: &Block) {
    let body = blk.canonical_bytes();
    buf.put_slice(&body);
    match &blk.signature {
        Some(cert) => {
            buf.put_u8(1);
            buf.put_slice(&cert.to_bytes());
        }
        None => buf.put_u8(0),
    }
}

fn get_signed_block(bz: &mut Bytes) -> anyhow::Result<Arc<Block>> {
    // Mirror `Block::decode_body`'s layout field by field on the real
    // cursor, so it ends up positioned exactly where the signature byte
    // that trails the block body in a `Propose`/`RespBlock` message starts.
    if bz.remaining() < 12 {
        bail!("block body too short");
    }
    let proposer = bz.get_u32_le();
    if proposer > u16::MAX as u32 {
        bail!("proposer id {proposer} out of range");
    }
    let height = bz.get_u32_le();

    let parent_count = bz.get_u32_le() as usize;
    let mut parent_hashes = Vec::with_capacity(parent_count);
    for _ in 0..parent_count {
        parent_hashes.push(get_digest(bz)?);
    }

    if bz.remaining() < 4 {
        bail!("truncated cmd count");
    }
    let cmd_count = bz.get_u32_le() as usize;
    let mut cmds = Vec::with_capacity(cmd_count);
    for _ in 0..cmd_count {
        cmds.push(get_digest(bz)?);
    }

    if bz.remaining() < 4 {
        bail!("truncated extra length");
    }
    let extra_len = bz.get_u32_le() as usize;
    if bz.remaining() < extra_len {
        bail!("truncated extra payload");
    }
    let extra = bz.copy_to_bytes(extra_len);

    let proposer = proposer as ReplicaId;
    let parents = parent_hashes;

    if bz.remaining() < 1 {
        bail!("truncated signature presence flag");
    }
    let has_sig = bz.get_u8();
    let signature = if has_sig == 1 {
        if bz.remaining() < 65 {
            bail!("truncated signature");
        }
        let mut sig_bytes = [0u8; 65];
        bz.copy_to_slice(&mut sig_bytes);
        Some(PartCert::from_bytes(&sig_bytes)?)
    } else {
        None
    };

    Ok(Block::from_parts(proposer, height, parents, cmds, extra, signature))
}

impl Message {
    pub fn opcode(&self) -> u8 {
        match self {
            Message::Propose(_) => OP_PROPOSE,
            Message::ReqBlock(_) => OP_REQ_BLOCK,
            Message::RespBlock(_) => OP_RESP_BLOCK,
            Message::ReqCmd(_) => OP_REQ_CMD,
            Message::RespCmd(..) => OP_RESP_CMD,
        }
    }

    /// Encode the opcode byte followed by the message's payload. Framing
    /// (the length prefix) is the codec's job, not this method's.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(self.opcode());
        match self {
            Message::Propose(blk) => put_signed_block(&mut buf, blk),
            Message::ReqBlock(hashes) => {
                buf.put_u32_le(hashes.len() as u32);
                for h in hashes {
                    put_digest(&mut buf, h);
                }
            }
            Message::RespBlock(blocks) => {
                buf.put_u32_le(blocks.len() as u32);
                for blk in blocks {
                    put_signed_block(&mut buf, blk);
                }
            }
            Message::ReqCmd(payload) => {
                buf.put_u32_le(payload.len() as u32);
                buf.put_slice(payload);
            }
            Message::RespCmd(fin, payload) => {
                buf.put_u16_le(fin.rid);
                buf.put_i8(fin.decision);
                buf.put_u32_le(fin.cmd_idx);
                buf.put_u32_le(fin.cmd_height);
                put_digest(&mut buf, &fin.cmd_hash);
                if fin.decision == 1 {
                    put_digest(&mut buf, &fin.blk_hash);
                }
                match payload {
                    Some(p) => {
                        buf.put_u8(1);
                        buf.put_u32_le(p.len() as u32);
                        buf.put_slice(p);
                    }
                    None => buf.put_u8(0),
                }
            }
        }
        buf.freeze()
    }

    /// Decode a full message (opcode + payload) from bytes already stripped
    /// of their length prefix by the codec.
    pub fn decode(mut bz: Bytes) -> anyhow::Result<Self> {
        if bz.is_empty() {
            bail!("empty message");
        }
        let opcode = bz.get_u8();
        match opcode {
            OP_PROPOSE => Ok(Message::Propose(get_signed_block(&mut bz)?)),
            OP_REQ_BLOCK => {
                if bz.remaining() < 4 {
                    bail!("truncated ReqBlock count");
                }
                let count = bz.get_u32_le() as usize;
                let mut hashes = Vec::with_capacity(count);
                for _ in 0..count {
                    hashes.push(get_digest(&mut bz)?);
                }
                Ok(Message::ReqBlock(hashes))
            }
            OP_RESP_BLOCK => {
                if bz.remaining() < 4 {
                    bail!("truncated RespBlock count");
                }
                let count = bz.get_u32_le() as usize;
                let mut blocks = Vec::with_capacity(count);
                for _ in 0..count {
                    blocks.push(get_signed_block(&mut bz)?);
                }
                Ok(Message::RespBlock(blocks))
            }
            OP_REQ_CMD => {
                if bz.remaining() < 4 {
                    bail!("truncated ReqCmd length");
                }
                let len = bz.get_u32_le() as usize;
                if bz.remaining() < len {
                    bail!("truncated ReqCmd payload");
                }
                Ok(Message::ReqCmd(bz.copy_to_bytes(len)))
            }
            OP_RESP_CMD => {
                if bz.remaining() < 2 + 1 + 4 + 4 + 32 {
                    bail!("truncated RespCmd header");
                }
                let rid: ReplicaId = bz.get_u16_le();
                let decision = bz.get_i8();
                let cmd_idx = bz.get_u32_le();
                let cmd_height: BlockHeight = bz.get_u32_le();
                let cmd_hash = get_digest(&mut bz)?;
                let blk_hash = if decision == 1 {
                    get_digest(&mut bz)?
                } else {
                    Digest::ZERO
                };
                let fin = Finality {
                    rid,
                    decision,
                    cmd_idx,
                    cmd_height,
                    cmd_hash,
                    blk_hash,
                };
                if bz.remaining() < 1 {
                    bail!("truncated RespCmd payload flag");
                }
                let has_payload = bz.get_u8();
                let payload = if has_payload == 1 {
                    if bz.remaining() < 4 {
                        bail!("truncated RespCmd payload length");
                    }
                    let len = bz.get_u32_le() as usize;
                    if bz.remaining() < len {
                        bail!("truncated RespCmd payload");
                    }
                    Some(bz.copy_to_bytes(len))
                } else {
                    None
                };
                Ok(Message::RespCmd(fin, payload))
            }
            other => bail!("unknown opcode {other:#04x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use e2c_storage::genesis_block;

    #[test]
    fn propose_roundtrips() {
        let msg = Message::Propose(genesis_block());
        let decoded = Message::decode(msg.encode()).unwrap();
        match decoded {
            Message::Propose(blk) => assert_eq!(blk.hash(), genesis_block().hash()),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn req_block_roundtrips() {
        let hashes = vec![Digest::hash(b"a"), Digest::hash(b"b")];
        let msg = Message::ReqBlock(hashes.clone());
        match Message::decode(msg.encode()).unwrap() {
            Message::ReqBlock(h) => assert_eq!(h, hashes),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn resp_block_roundtrips_multiple() {
        let a = genesis_block();
        let b = Block::seal(1, 1, vec![a.hash()], vec![Digest::hash(b"c")], Bytes::new(), None);
        let msg = Message::RespBlock(vec![a.clone(), b.clone()]);
        match Message::decode(msg.encode()).unwrap() {
            Message::RespBlock(blocks) => {
                assert_eq!(blocks.len(), 2);
                assert_eq!(blocks[0].hash(), a.hash());
                assert_eq!(blocks[1].hash(), b.hash());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn resp_cmd_roundtrips_without_blk_hash_when_not_committed() {
        let fin = Finality {
            rid: 2,
            decision: 0,
            cmd_idx: 0,
            cmd_height: 0,
            cmd_hash: Digest::hash(b"pending"),
            blk_hash: Digest::ZERO,
        };
        let msg = Message::RespCmd(fin.clone(), None);
        match Message::decode(msg.encode()).unwrap() {
            Message::RespCmd(decoded, payload) => {
                assert_eq!(decoded, fin);
                assert!(payload.is_none());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn rejects_unknown_opcode() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x7f);
        assert!(Message::decode(buf.freeze()).is_err());
    }
}
