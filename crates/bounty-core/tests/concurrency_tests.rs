mod common;

use bounty_core::{BountyError, BountyState};
use bounty_security::PauseScope;
use bounty_types::BountyId;
use common::*;
use std::collections::HashSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_have_one_winner() {
    let h = harness().await;
    let bounty = BountyId::from(42);
    h.fund(42, 10_000).await;
    let alice_stake = h.stake(42, "alice", 1_000).await;
    let bob_stake = h.stake(42, "bob", 1_000).await;

    let alice = {
        let machine = h.machine.clone();
        let bounty = bounty.clone();
        tokio::spawn(async move {
            machine
                .claim(&bounty, &claimant("alice"), Some(alice_stake), None)
                .await
        })
    };
    let bob = {
        let machine = h.machine.clone();
        let bounty = bounty.clone();
        tokio::spawn(async move {
            machine
                .claim(&bounty, &claimant("bob"), Some(bob_stake), None)
                .await
        })
    };

    let results = vec![alice.await.unwrap(), bob.await.unwrap()];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let losers: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(winners, 1);
    assert_eq!(losers.len(), 1);
    assert!(matches!(losers[0], BountyError::AlreadyClaimed { .. }));

    let record = h.machine.get(&bounty).await.unwrap();
    assert_eq!(record.state, BountyState::Claimed);
    let claims = h
        .machine
        .audit_trail(&bounty)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.to_state == Some(BountyState::Claimed))
        .count();
    assert_eq!(claims, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_settles_pay_once() {
    let h = harness().await;
    let bounty = BountyId::from(42);
    h.approved(42, 10_000, "alice").await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let machine = h.machine.clone();
        let bounty = bounty.clone();
        handles.push(tokio::spawn(async move { machine.settle(&bounty).await }));
    }

    let mut signatures = HashSet::new();
    for handle in handles {
        let receipt = handle.await.unwrap().unwrap();
        signatures.insert(receipt.signature);
    }
    assert_eq!(signatures.len(), 1);
    assert_eq!(h.chain.submitted_count().await, 1);
    assert_eq!(h.machine.get(&bounty).await.unwrap().state, BountyState::Paid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_bounties_settle_with_distinct_references() {
    let h = harness().await;
    for id in 1..=3u64 {
        h.approved(id, 1_000 * id, &format!("worker{}", id)).await;
    }

    let mut handles = Vec::new();
    for id in 1..=3u64 {
        let machine = h.machine.clone();
        handles.push(tokio::spawn(async move {
            machine.settle(&BountyId::from(id)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let memos: HashSet<_> = h
        .chain
        .submitted_transactions()
        .await
        .into_iter()
        .filter_map(|tx| tx.memo)
        .collect();
    assert_eq!(memos.len(), 3);
    assert!(memos.contains("b:1") && memos.contains("b:2") && memos.contains("b:3"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pause_toggle_waits_for_in_flight_settlement() {
    let h = harness().await;
    let bounty = BountyId::from(42);
    h.approved(42, 10_000, "alice").await;

    let settle = {
        let machine = h.machine.clone();
        let bounty = bounty.clone();
        tokio::spawn(async move { machine.settle(&bounty).await })
    };
    let pause = {
        let machine = h.machine.clone();
        tokio::spawn(async move {
            machine
                .set_pause(PauseScope::Payouts, true, &admin())
                .await
        })
    };

    // Either the settlement got in before the pause, or it was refused.
    // It never lands after the pause took effect.
    let settled = settle.await.unwrap();
    pause.await.unwrap().unwrap();
    match settled {
        Ok(_) => assert_eq!(h.chain.submitted_count().await, 1),
        Err(e) => {
            assert_eq!(e, BountyError::SystemPaused(PauseScope::Payouts));
            assert_eq!(h.chain.submitted_count().await, 0);
        }
    }
    let expected = if h.chain.submitted_count().await == 1 {
        BountyState::Paid
    } else {
        BountyState::Approved
    };
    assert_eq!(h.machine.get(&bounty).await.unwrap().state, expected);
}
