// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! `AppShell`: the client-facing side of a replica. It queues submitted
//! commands for the leader to batch, and dispatches each `Finality` the
//! core produces back to whichever caller is waiting on that command's
//! hash. The core stays ignorant of client sessions; this is `e2c-core`'s
//! `DecisionSink` plus its `CommandSource`, in one struct so both sides
//! share the same pending/waiting bookkeeping.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use e2c_core::{CommandSource, DecisionSink, Digest, Finality};
use e2c_tracing::emit;
use tokio::sync::oneshot;

use crate::events::{CommandDecided, CommandSubmitted, DecisionDropped};

#[derive(Default)]
struct Inner {
    pending: VecDeque<Digest>,
    waiters: HashMap<Digest, oneshot::Sender<Finality>>,
}

/// Shared command intake and decision dispatch for one replica.
///
/// Cloning is cheap and intended: the network binding holds one handle to
/// accept `ReqCmd` submissions, the reactor's `CommandSource` borrow is a
/// second, and `e2c-core` holds the `DecisionSink` side as a third.
pub struct AppShell {
    inner: Mutex<Inner>,
    notify: tokio::sync::mpsc::Sender<()>,
    decided_count: AtomicU64,
}

impl AppShell {
    /// `notify` is signalled (best-effort) every time a command is queued,
    /// so the reactor can check whether a batch is ready without polling.
    /// Typically this is the sending half of the channel feeding
    /// `e2c_core::ReactorEvent::CommandSubmitted`.
    pub fn new(notify: tokio::sync::mpsc::Sender<()>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify,
            decided_count: AtomicU64::new(0),
        }
    }

    /// Accept a client command. Returns a receiver that resolves once the
    /// core finalizes it — the caller (typically the network binding,
    /// answering a `ReqCmd`) awaits this to send back `RespCmd`.
    pub fn submit(&self, cmd_hash: Digest, _payload: Option<Bytes>) -> oneshot::Receiver<Finality> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().expect("AppShell mutex poisoned");
            inner.pending.push_back(cmd_hash);
            inner.waiters.insert(cmd_hash, tx);
        }
        emit!(CommandSubmitted {
            cmd_hash: cmd_hash.to_string().as_str()
        });
        let _ = self.notify.try_send(());
        rx
    }

    pub fn decided_count(&self) -> u64 {
        self.decided_count.load(Ordering::Relaxed)
    }
}

impl CommandSource for AppShell {
    fn take_batch(&self, max: usize) -> Vec<Digest> {
        let mut inner = self.inner.lock().expect("AppShell mutex poisoned");
        let n = max.min(inner.pending.len());
        inner.pending.drain(..n).collect()
    }
}

impl DecisionSink for AppShell {
    fn on_decide(&self, fin: Finality) {
        self.decided_count.fetch_add(1, Ordering::Relaxed);
        let waiter = {
            let mut inner = self.inner.lock().expect("AppShell mutex poisoned");
            inner.waiters.remove(&fin.cmd_hash)
        };
        match waiter {
            Some(tx) => {
                emit!(CommandDecided {
                    cmd_hash: fin.cmd_hash.to_string().as_str(),
                    blk_hash: fin.blk_hash.to_string().as_str(),
                    cmd_height: fin.cmd_height
                });
                // The receiver may already be gone (client disconnected);
                // that is not this replica's problem to report.
                let _ = tx.send(fin);
            }
            None => emit!(DecisionDropped {
                cmd_hash: fin.cmd_hash.to_string().as_str()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell() -> (AppShell, tokio::sync::mpsc::Receiver<()>) {
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        (AppShell::new(tx), rx)
    }

    #[tokio::test]
    async fn submit_then_decide_resolves_the_waiter() {
        let (shell, mut notify_rx) = shell();
        let cmd_hash = Digest::hash(b"cmd-a");

        let rx = shell.submit(cmd_hash, None);
        notify_rx.try_recv().expect("submit should notify");

        let batch = shell.take_batch(4);
        assert_eq!(batch, vec![cmd_hash]);

        let fin = Finality::committed(0, 0, 1, cmd_hash, Digest::hash(b"blk"));
        shell.on_decide(fin.clone());

        let received = rx.await.unwrap();
        assert_eq!(received, fin);
        assert_eq!(shell.decided_count(), 1);
    }

    #[test]
    fn take_batch_respects_max_and_drains_in_order() {
        let (shell, _rx) = shell();
        let a = Digest::hash(b"a");
        let b = Digest::hash(b"b");
        let c = Digest::hash(b"c");
        let _ = shell.submit(a, None);
        let _ = shell.submit(b, None);
        let _ = shell.submit(c, None);

        let first = shell.take_batch(2);
        assert_eq!(first, vec![a, b]);
        let second = shell.take_batch(2);
        assert_eq!(second, vec![c]);
    }

    #[test]
    fn decision_with_no_waiter_does_not_panic() {
        let (shell, _rx) = shell();
        let fin = Finality::committed(0, 0, 1, Digest::hash(b"unknown"), Digest::hash(b"blk"));
        shell.on_decide(fin);
    }
}
