// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Multi-replica scenario tests, driving a small `Vec<CoreStateMachine>`
//! harness wired through in-memory broadcast instead of real sockets —
//! the `fendermint/testing` style of exercising protocol logic without a
//! network stack. The cluster-building helpers live in `e2c-testing` so
//! other crates' integration tests can reuse them.

use bytes::Bytes;
use e2c_core::{
    CoreError, CoreStateMachine, Effect, FixedPacemaker, NullDecisionSink, ReplicaConfig,
    RoundRobinPacemaker, RuntimeParams,
};
use e2c_storage::{Block, Digest};
use e2c_testing::{addr, fixed_cluster, keys, peers_for, sign};
use std::sync::Arc;
use std::time::Duration;

/// S1: three-node happy path. The leader proposes, the other two receive
/// and accept, and once every replica's commit timer fires the command is
/// finalized identically everywhere.
#[test]
fn s1_three_node_happy_path() {
    let (mut replicas, keys) = fixed_cluster(3, 0);
    let cmd = Digest::hash(b"s1-cmd");

    let parents = replicas[0].compose_parents();
    let (blk, leader_effects) = replicas[0]
        .on_propose(vec![cmd], parents, Bytes::new(), &keys[0])
        .unwrap();
    assert!(leader_effects
        .iter()
        .any(|e| matches!(e, Effect::ArmCommitTimer { height: 1, .. })));

    for replica in replicas.iter_mut().skip(1) {
        let effects = replica.on_receive_proposal(blk.clone(), true).unwrap();
        assert!(effects.iter().any(|e| matches!(e, Effect::Broadcast(_))));
    }

    for replica in replicas.iter_mut() {
        let (finalities, _) = replica.commit_timer_cb(1);
        assert_eq!(finalities.len(), 1);
        assert_eq!(finalities[0].blk_hash, blk.hash());
        assert!(replica.is_committed(&blk.hash()));
    }
}

/// S2: a proposal whose direct parent hasn't arrived yet is rejected with
/// `NotDelivered`; once the parent is delivered, redelivering the same
/// proposal succeeds.
#[test]
fn s2_proposal_blocked_on_missing_ancestor_then_resolves() {
    let (mut replicas, keys) = fixed_cluster(3, 0);

    let parents1 = replicas[0].compose_parents();
    let (b1, _) = replicas[0]
        .on_propose(vec![Digest::hash(b"c0")], parents1, Bytes::new(), &keys[0])
        .unwrap();
    let parents2 = replicas[0].compose_parents();
    let (b2, _) = replicas[0]
        .on_propose(vec![Digest::hash(b"c1")], parents2, Bytes::new(), &keys[0])
        .unwrap();

    // Replica 1 sees b2 before b1 (e.g. b1's broadcast was delayed).
    let err = replicas[1].on_receive_proposal(b2.clone(), true).unwrap_err();
    assert!(matches!(err, CoreError::NotDelivered(h) if h == b1.hash()));

    // Deliver the missing ancestor, then retry — this mirrors what
    // `Reactor::retry_blocked_on` does once a fetch response arrives.
    replicas[1].on_deliver_blk(b1.clone()).unwrap();
    replicas[1].update(b1.clone());
    let effects = replicas[1].on_receive_proposal(b2.clone(), true).unwrap();
    assert!(effects.iter().any(|e| matches!(e, Effect::Broadcast(_))));

    let (finalities, _) = replicas[1].commit_timer_cb(2);
    assert_eq!(finalities.len(), 2);
}

/// S3: two conflicting blocks proposed at the same height are both
/// delivered, but only the first is ever committed; the second increments
/// the equivocation counter and never appears in a `Finality`.
#[test]
fn s3_equivocation_never_commits() {
    let (mut replicas, keys) = fixed_cluster(3, 0);
    let parents = replicas[1].compose_parents();
    let parent_hashes: Vec<Digest> = parents.iter().map(|p| p.hash()).collect();

    let a = Block::seal(0, 1, parent_hashes.clone(), vec![Digest::hash(b"a")], Bytes::new(), None);
    let a = sign(&keys[0], &a);
    let b = Block::seal(0, 1, parent_hashes, vec![Digest::hash(b"b")], Bytes::new(), None);
    let b = sign(&keys[0], &b);
    assert_ne!(a.hash(), b.hash());

    let effects_a = replicas[1].on_receive_proposal(a.clone(), true).unwrap();
    assert!(!effects_a.is_empty());

    let effects_b = replicas[1].on_receive_proposal(b.clone(), true).unwrap();
    assert!(effects_b.is_empty(), "equivocating block must not be forwarded");
    assert_eq!(replicas[1].equivocations_seen, 1);

    let (finalities, _) = replicas[1].commit_timer_cb(1);
    assert_eq!(finalities.len(), 1);
    assert_eq!(finalities[0].blk_hash, a.hash());
    assert!(replicas[1].is_committed(&a.hash()));
    assert!(!replicas[1].is_committed(&b.hash()));
}

/// S4: a block proposed by a replica other than the pacemaker's current
/// proposer is rejected outright; after impeachment rotates the proposer,
/// the same replica's next proposal is accepted.
#[test]
fn s4_wrong_proposer_rejected_then_accepted_after_impeachment() {
    let keys = keys(3);
    let pacemaker = Arc::new(RoundRobinPacemaker::new(3, 0));
    let cfg = Arc::new(ReplicaConfig::new(
        1,
        addr(9101),
        peers_for(1, &keys),
        RuntimeParams::new(Duration::from_millis(50), 8),
    ));
    let mut replica = CoreStateMachine::new(1, cfg, pacemaker.clone(), Arc::new(NullDecisionSink));

    let parents = replica.compose_parents();
    let parent_hashes: Vec<Digest> = parents.iter().map(|p| p.hash()).collect();
    let premature = Block::seal(1, 1, parent_hashes.clone(), vec![], Bytes::new(), None);
    let premature = sign(&keys[1], &premature);

    let err = replica.on_receive_proposal(premature, true).unwrap_err();
    assert!(matches!(err, CoreError::WrongProposer { proposer: 1, expected: 0 }));

    // Replica 0 never produced a block; the app layer impeaches it.
    pacemaker.impeach();
    assert_eq!(pacemaker.get_proposer(), 1);

    let blk = Block::seal(1, 1, parent_hashes, vec![Digest::hash(b"c0")], Bytes::new(), None);
    let blk = sign(&keys[1], &blk);
    let effects = replica.on_receive_proposal(blk, true).unwrap();
    assert!(!effects.is_empty());
}

/// S5: the same ancestor-fetch situation as S2, but verified at the
/// `Reactor` level — a proposal arriving before its parent is parked, a
/// `request_blocks` call goes out, and delivering the parent later drains
/// the park list without the caller re-submitting the child proposal.
#[tokio::test]
async fn s5_reactor_parks_and_retries_on_missing_ancestor() {
    use e2c_core::{Reactor, ReactorEvent};
    use e2c_testing::{NoCommands, RecordingSink};
    use tokio::sync::mpsc;

    let (leader_replicas, keys) = fixed_cluster(3, 0);
    let mut leader = leader_replicas.into_iter().next().unwrap();
    let parents1 = leader.compose_parents();
    let (b1, _) = leader
        .on_propose(vec![Digest::hash(b"c0")], parents1, Bytes::new(), &keys[0])
        .unwrap();
    let parents2 = leader.compose_parents();
    let (b2, _) = leader
        .on_propose(vec![Digest::hash(b"c1")], parents2, Bytes::new(), &keys[0])
        .unwrap();

    let cfg = Arc::new(ReplicaConfig::new(
        1,
        addr(9201),
        peers_for(1, &keys),
        RuntimeParams::new(Duration::from_millis(50), 8),
    ));
    let follower = CoreStateMachine::new(
        1,
        cfg,
        Arc::new(e2c_core::FixedPacemaker::new(0)),
        Arc::new(NullDecisionSink),
    );
    let sink = Arc::new(RecordingSink::default());
    let (_tx, rx) = mpsc::channel(8);
    let mut reactor = Reactor::new(
        follower,
        sink.clone(),
        Arc::new(e2c_core::InlineVerifier),
        Arc::new(NoCommands),
        keys[1].clone(),
        rx,
    );

    // b2 arrives first: its parent b1 is missing, so it's parked and a
    // fetch for b1 is issued to replica 0.
    reactor
        .handle_event(ReactorEvent::Proposal {
            blk: b2.clone(),
            sig_valid: true,
            from: 0,
        })
        .await;
    assert_eq!(reactor.core().b_mark_height(), 0);
    assert_eq!(sink.requested.lock().unwrap().len(), 1);
    assert_eq!(sink.requested.lock().unwrap()[0].0, vec![b1.hash()]);

    // The fetch response delivers b1, which should drain the park list and
    // accept b2 too, without b2 ever being resubmitted by the caller.
    reactor
        .handle_event(ReactorEvent::BlocksFetched {
            blocks: vec![b1.clone()],
        })
        .await;
    assert_eq!(reactor.core().b_mark_height(), 2);
    assert!(sink.broadcasted.lock().unwrap().iter().any(|b| b.hash() == b2.hash()));
}

/// S6: a replica that receives the same proposal twice forwards it only
/// once.
#[test]
fn s6_duplicate_proposal_is_not_reforwarded() {
    let (mut replicas, keys) = fixed_cluster(3, 0);
    let parents = replicas[0].compose_parents();
    let (blk, _) = replicas[0]
        .on_propose(vec![Digest::hash(b"c0")], parents, Bytes::new(), &keys[0])
        .unwrap();

    let first = replicas[1].on_receive_proposal(blk.clone(), true).unwrap();
    assert!(!first.is_empty());

    let second = replicas[1].on_receive_proposal(blk, true).unwrap();
    assert!(second.is_empty(), "duplicate delivery must not be re-broadcast");
}
