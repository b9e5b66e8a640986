mod common;

use bounty_core::{BountyRecord, BountyState, FileAuditLog, AuditLog, MachineConfig};
use bounty_ledger::Fault;
use bounty_security::PauseScope;
use bounty_types::{Actor, BountyId, TokenAmount};
use chrono::{Duration, Utc};
use common::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Claim(&'static str),
    Submit(&'static str, bool),
    Review(u8),
    Approve,
    Settle,
    SettleWithFault,
    Refund,
    Reject,
    Expire,
    TogglePayoutPause,
}

prop_compose! {
    fn arb_name()(i in 0usize..2) -> &'static str {
        ["alice", "bob"][i]
    }
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        arb_name().prop_map(Op::Claim),
        (arb_name(), any::<bool>()).prop_map(|(n, dirty)| Op::Submit(n, dirty)),
        (0u8..=10).prop_map(Op::Review),
        Just(Op::Approve),
        Just(Op::Settle),
        Just(Op::SettleWithFault),
        Just(Op::Refund),
        Just(Op::Reject),
        Just(Op::Expire),
        Just(Op::TogglePayoutPause),
    ]
}

fn check_record(record: &BountyRecord) -> Result<(), TestCaseError> {
    prop_assert!(record.receipt_matches_state(), "receipt/state mismatch in {:?}", record.state);
    prop_assert_eq!(record.refund_receipt.is_some(), record.state == BountyState::Refunded);
    if record.state.holds_claim() {
        prop_assert!(record.claim.is_some());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_receipt_iff_paid(ops in prop::collection::vec(arb_op(), 1..24)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let config = MachineConfig {
                require_stake: false,
                ..Default::default()
            };
            let h = harness_with(config).await;
            let bounty = BountyId::from(42);
            h.fund(42, 10_000).await;
            let mut paused = false;
            let mut paid_signature = None;

            for op in ops {
                let _ = match op {
                    Op::Claim(name) => h.machine.claim(&bounty, &claimant(name), None, None).await.map(|_| ()),
                    Op::Submit(name, dirty) => {
                        let diff = if dirty { SETTLEMENT_PATH_DIFF } else { CLEAN_DIFF };
                        h.machine.submit(&bounty, submission(42, name, diff)).await.map(|_| ())
                    }
                    Op::Review(score) => h.machine.record_review(&bounty, verdict(score)).await.map(|_| ()),
                    Op::Approve => h.machine.approve(&bounty, &admin()).await.map(|_| ()),
                    Op::Settle => h.machine.settle(&bounty).await.map(|_| ()),
                    Op::SettleWithFault => {
                        // An unconsumed fault hits whichever settlement comes next
                        h.chain.inject(Fault::Reject("node is behind".to_string())).await;
                        h.machine.settle(&bounty).await.map(|_| ())
                    }
                    Op::Refund => h.machine.refund(&bounty, &admin()).await.map(|_| ()),
                    Op::Reject => h.machine.reject(&bounty, &admin(), "operator decision").await.map(|_| ()),
                    Op::Expire => h
                        .machine
                        .expire_stale_claims(Utc::now() + Duration::days(8))
                        .await
                        .map(|_| ()),
                    Op::TogglePayoutPause => {
                        paused = !paused;
                        h.machine.set_pause(PauseScope::Payouts, paused, &admin()).await.map(|_| ())
                    }
                };

                let record = h.machine.get(&bounty).await.unwrap();
                check_record(&record)?;

                // Once paid, the receipt never changes
                if let Some(receipt) = &record.payout_receipt {
                    let first = paid_signature.get_or_insert_with(|| receipt.signature.clone());
                    prop_assert_eq!(&*first, &receipt.signature);
                }
            }

            // Money out of escrow matches what the record says was settled
            let record = h.machine.get(&bounty).await.unwrap();
            let escrow = h.chain.balance(&h.escrow).await;
            let settled = record.payout_receipt.is_some() || record.refund_receipt.is_some();
            prop_assert_eq!(escrow.is_zero(), settled);
            prop_assert!(h.chain.submitted_count().await <= 1);
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn test_audit_log_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit").join("bounty.jsonl");

    {
        let log = FileAuditLog::open(&path).await.unwrap();
        let entry = bounty_core::AuditEntry::transition(
            &BountyId::from(42),
            None,
            BountyState::Open,
            &Actor::System,
            "funded",
        );
        log.append(entry).await.unwrap();
    }

    let reopened = FileAuditLog::open(&path).await.unwrap();
    let entries = reopened.entries_for(&BountyId::from(42)).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].to_state, Some(BountyState::Open));

    let next = reopened
        .append(bounty_core::AuditEntry::system(&Actor::Admin("ops".into()), "payouts pause engaged"))
        .await
        .unwrap();
    assert!(next > entries[0].seq);
}

#[tokio::test]
async fn test_overfunded_deposit_records_requested_amount() {
    let h = harness().await;
    let signature = h.deposit(h.funder, 12_000, "b:9").await;
    let record = h
        .machine
        .fund_bounty(
            BountyId::from(9),
            TokenAmount::from_base_units(10_000),
            signature,
            h.funder,
            Default::default(),
        )
        .await
        .unwrap();
    assert_eq!(record.amount, TokenAmount::from_base_units(10_000));
    check_record(&record).unwrap();
}
