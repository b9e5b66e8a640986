use bounty_core::{BountyState, Recommendation, ReviewVerdict, TaskSpec};
use bounty_node::{BountyNode, NodeConfig};
use bounty_security::sign_webhook_body;
use bounty_types::{Actor, BountyId, ClaimantId, Submission, TokenAmount, WalletAddress};
use std::time::Duration;
use tempfile::TempDir;

const SECRET: &[u8] = b"node-test-secret";

const CLEAN_DIFF: &str = "\
diff --git a/src/cache.rs b/src/cache.rs
--- a/src/cache.rs
+++ b/src/cache.rs
@@ -1,3 +1,4 @@
 pub fn hits(cache: &Cache) -> usize {
+    cache.warm();
     cache.len()
 }
";

fn test_config(dir: &TempDir) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.node.data_dir = dir.path().to_path_buf();
    config.ledger.treasury_wallet = WalletAddress::from_bytes([2u8; 32]).to_string();
    config.ledger.poll_interval_ms = 10;
    config.ledger.confirmation_timeout_ms = 500;
    config.engine.require_stake = false;
    config.engine.require_double_approval = false;
    config
}

async fn funded_node(dir: &TempDir, id: u64, amount: u64) -> BountyNode {
    let node = BountyNode::new(test_config(dir))
        .await
        .unwrap()
        .with_webhook_secret(SECRET);
    let funder = WalletAddress::from_bytes([9u8; 32]);
    let signature = node
        .chain()
        .deposit(
            funder,
            node.escrow_address(),
            TokenAmount::from_base_units(amount),
            Some(&format!("b:{}", id)),
        )
        .await;
    node.machine()
        .fund_bounty(
            BountyId::from(id),
            TokenAmount::from_base_units(amount),
            signature,
            funder,
            TaskSpec {
                title: format!("Task {}", id),
                labels: vec!["performance".to_string()],
            },
        )
        .await
        .unwrap();
    node
}

fn claim_body(id: u64, claimant: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "type": "claim_requested",
        "bounty_id": id.to_string(),
        "claimant": claimant,
        "stake_signature": null,
    }))
    .unwrap()
}

#[tokio::test]
async fn test_signed_webhook_claims_bounty() {
    let dir = TempDir::new().unwrap();
    let node = funded_node(&dir, 11, 1_000_000).await;

    let body = claim_body(11, "alice");
    let header = sign_webhook_body(&body, SECRET).unwrap();
    let state = node.ingest_webhook(&body, &header).await.unwrap();

    assert_eq!(state, BountyState::Claimed);
    let record = node.machine().get(&BountyId::from(11)).await.unwrap();
    assert_eq!(record.state, BountyState::Claimed);
}

#[tokio::test]
async fn test_unsigned_webhook_is_refused() {
    let dir = TempDir::new().unwrap();
    let node = funded_node(&dir, 12, 1_000_000).await;

    let body = claim_body(12, "alice");
    let forged = sign_webhook_body(&body, b"wrong-secret").unwrap();
    assert!(node.ingest_webhook(&body, &forged).await.is_err());
    assert!(node.ingest_webhook(&body, "").await.is_err());

    let record = node.machine().get(&BountyId::from(12)).await.unwrap();
    assert_eq!(record.state, BountyState::Open);
}

#[tokio::test]
async fn test_malformed_webhook_body_is_refused() {
    let dir = TempDir::new().unwrap();
    let node = funded_node(&dir, 13, 1_000_000).await;

    let body = br#"{"type":"launch_rockets","bounty_id":"13"}"#;
    let header = sign_webhook_body(body, SECRET).unwrap();
    assert!(node.ingest_webhook(body, &header).await.is_err());
}

#[tokio::test]
async fn test_scheduler_pays_approved_bounty() {
    let dir = TempDir::new().unwrap();
    let node = funded_node(&dir, 14, 1_000_000).await;
    let id = BountyId::from(14);
    let alice = ClaimantId::new("alice").unwrap();
    let wallet = WalletAddress::from_bytes([7u8; 32]);

    node.machine()
        .claim(&id, &alice, None, Some(wallet))
        .await
        .unwrap();
    node.machine()
        .submit(
            &id,
            Submission {
                pr_number: 3,
                author: alice.clone(),
                title: "Warm the cache before reads".to_string(),
                description: format!(
                    "Warms the cache on first access so cold reads stop stalling.\nCloses #14\nWallet: {}",
                    wallet
                ),
                diff: CLEAN_DIFF.to_string(),
                payout_wallet: None,
            },
        )
        .await
        .unwrap();
    let verdict = ReviewVerdict::new(
        9,
        Recommendation::Approve,
        "meets the task",
        Actor::Automation("oracle".to_string()),
    );
    let state = node.machine().record_review(&id, verdict).await.unwrap();
    assert_eq!(state, BountyState::Approved);

    node.run_until(tokio::time::sleep(Duration::from_millis(300)))
        .await
        .unwrap();

    let record = node.machine().get(&id).await.unwrap();
    assert_eq!(record.state, BountyState::Paid);
    assert!(record.payout_receipt.is_some());

    let trail = node.audit_trail(&id).await.unwrap();
    assert_eq!(trail.last().and_then(|e| e.to_state), Some(BountyState::Paid));
}

#[tokio::test]
async fn test_audit_log_and_key_survive_restart() {
    let dir = TempDir::new().unwrap();
    let escrow = {
        let node = funded_node(&dir, 15, 500_000).await;
        node.escrow_address()
    };

    let reopened = BountyNode::new(test_config(&dir)).await.unwrap();
    assert_eq!(reopened.escrow_address(), escrow);

    let trail = reopened.audit_trail(&BountyId::from(15)).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].to_state, Some(BountyState::Open));
}

#[test]
fn test_config_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bounty-config.toml");

    let mut config = test_config(&dir);
    config.engine.approval_threshold = 7;
    config.security.pause.payouts = true;
    config.scheduler.payout_interval_secs = 5;
    config.save_to_file(&path).unwrap();

    let loaded = NodeConfig::from_file(&path).unwrap();
    assert_eq!(loaded.engine, config.engine);
    assert_eq!(loaded.security, config.security);
    assert_eq!(loaded.scheduler.payout_interval_secs, 5);
    assert_eq!(loaded.ledger.treasury_wallet, config.ledger.treasury_wallet);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_partial_config_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.toml");
    std::fs::write(
        &path,
        format!(
            "[ledger]\ntreasury_wallet = \"{}\"\ntreasury_bps = 250\n\n[engine]\nmax_active_claims = 1\n",
            WalletAddress::from_bytes([2u8; 32])
        ),
    )
    .unwrap();

    let config = NodeConfig::from_file(&path).unwrap();
    assert_eq!(config.ledger.treasury_bps, 250);
    assert_eq!(config.engine.max_active_claims, 1);
    assert_eq!(config.engine.approval_threshold, 8);
    assert_eq!(config.storage.backend, "memory");
    assert!(config.validate().is_ok());
}
