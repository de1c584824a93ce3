// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! `NetworkBinding`: owns per-peer TCP connections, dispatches inbound
//! messages into the reactor's event channel (verifying signatures off the
//! reactor thread first), and implements `e2c_core::NetworkSink` for
//! outbound `Propose`/`ReqBlock` traffic.

use crate::codec::MessageCodec;
use crate::wire::Message;
use async_trait::async_trait;
use e2c_core::{NetworkSink, ReactorEvent, ReplicaConfig, Verifier};
use e2c_storage::{Block, Digest, ReplicaId};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::Framed;

/// Outbound half of a peer connection: a queue a writer task drains,
/// reconnecting with backoff if the socket drops (spec §4.5 "the binding
/// owns per-peer connections").
struct PeerHandle {
    outbound: mpsc::Sender<Message>,
}

/// Owns every peer connection for one replica and the listening socket
/// accepting inbound connections, translating wire `Message`s to/from
/// `ReactorEvent`s.
pub struct NetworkBinding<V: Verifier> {
    own_id: ReplicaId,
    config: Arc<ReplicaConfig>,
    verifier: Arc<V>,
    events: mpsc::Sender<ReactorEvent>,
    peers: Mutex<HashMap<ReplicaId, PeerHandle>>,
}

impl<V: Verifier + 'static> NetworkBinding<V> {
    pub fn new(
        own_id: ReplicaId,
        config: Arc<ReplicaConfig>,
        verifier: Arc<V>,
        events: mpsc::Sender<ReactorEvent>,
    ) -> Arc<Self> {
        let binding = Arc::new(Self {
            own_id,
            config,
            verifier,
            events,
            peers: Mutex::new(HashMap::new()),
        });
        for peer in binding.config.peers.clone() {
            binding.clone().spawn_peer_writer(peer.id, peer.addr);
        }
        binding
    }

    /// Accept inbound connections forever; spawn a reader task per accepted
    /// stream. Each reader is fully independent — a peer address only
    /// drives the outbound direction, per `spawn_peer_writer`.
    pub async fn listen(self: Arc<Self>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.listen).await?;
        loop {
            let (stream, _addr) = listener.accept().await?;
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.read_loop(stream).await {
                    tracing::debug!(error = %e, "inbound connection closed");
                }
            });
        }
    }

    async fn read_loop(self: Arc<Self>, stream: TcpStream) -> anyhow::Result<()> {
        let mut framed = Framed::new(stream, MessageCodec::default());
        while let Some(msg) = framed.next().await {
            let msg = msg?;
            self.dispatch_inbound(msg).await;
        }
        Ok(())
    }

    async fn dispatch_inbound(&self, msg: Message) {
        match msg {
            Message::Propose(blk) => {
                let sig_valid = self.verify(&blk).await;
                let from = blk.proposer;
                let _ = self
                    .events
                    .send(ReactorEvent::Proposal { blk, sig_valid, from })
                    .await;
            }
            Message::RespBlock(blocks) => {
                let _ = self.events.send(ReactorEvent::BlocksFetched { blocks }).await;
            }
            Message::ReqBlock(_) | Message::ReqCmd(_) | Message::RespCmd(..) => {
                // Command intake and fetch responses are served by the app
                // layer, not the consensus reactor; wiring that consumer is
                // `e2c-app`'s responsibility, out of this binding's scope.
                tracing::debug!("dropping message type not consumed by the reactor");
            }
        }
    }

    async fn verify(&self, blk: &Block) -> bool {
        match self.config.pubkey(blk.proposer) {
            Some(pk) => self.verifier.verify(blk, &pk).await,
            None => blk.is_genesis(),
        }
    }

    /// Maintains one outbound connection to `peer_id`, reconnecting with a
    /// fixed backoff on failure. Messages sent while disconnected are
    /// dropped — at-least-once delivery for proposals and fetches is the
    /// reactor's job (commit timers and fetch retries re-send), not this
    /// transport's.
    fn spawn_peer_writer(self: Arc<Self>, peer_id: ReplicaId, addr: std::net::SocketAddr) {
        let (tx, mut rx) = mpsc::channel::<Message>(256);
        tokio::spawn(async move {
            self.peers
                .lock()
                .await
                .insert(peer_id, PeerHandle { outbound: tx });

            loop {
                let stream = match TcpStream::connect(addr).await {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::debug!(peer_id, error = %e, "peer connect failed, retrying");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        continue;
                    }
                };
                let mut framed = Framed::new(stream, MessageCodec::default());
                loop {
                    match rx.recv().await {
                        Some(msg) => {
                            if framed.send(msg).await.is_err() {
                                break;
                            }
                        }
                        None => return,
                    }
                }
            }
        });
    }
}

#[async_trait]
impl<V: Verifier + 'static> NetworkSink for NetworkBinding<V> {
    async fn broadcast(&self, blk: Arc<Block>) {
        let peers = self.peers.lock().await;
        for handle in peers.values() {
            let _ = handle.outbound.send(Message::Propose(blk.clone())).await;
        }
    }

    async fn request_blocks(&self, hashes: Vec<Digest>, from: ReplicaId) {
        let peers = self.peers.lock().await;
        if let Some(handle) = peers.get(&from) {
            let _ = handle.outbound.send(Message::ReqBlock(hashes)).await;
        }
    }
}
