#![allow(dead_code)]

use bounty_core::{
    BountyRecord, BountyStateMachine, MachineConfig, MemoryAuditLog, MemoryRecordStore,
    Recommendation, ReviewVerdict, TaskSpec,
};
use bounty_ledger::{EscrowAuthority, EscrowLedger, LedgerConfig, SimulatedChain};
use bounty_security::{GateConfig, SecurityGate};
use bounty_types::{
    Actor, BountyId, ClaimantId, Submission, TokenAmount, TxSignature, WalletAddress,
};
use std::sync::Arc;

pub const CLEAN_DIFF: &str = "\
diff --git a/src/cache.rs b/src/cache.rs
--- a/src/cache.rs
+++ b/src/cache.rs
@@ -1,3 +1,4 @@
 pub fn hits(cache: &Cache) -> usize {
+    cache.warm();
     cache.len()
 }
";

pub const SETTLEMENT_PATH_DIFF: &str = "\
diff --git a/src/payments/settle.rs b/src/payments/settle.rs
--- a/src/payments/settle.rs
+++ b/src/payments/settle.rs
@@ -10,3 +10,4 @@
 fn authorize(request: &Request) -> bool {
+    return true;
     request.signed_by_admin()
 }
";

pub struct Harness {
    pub chain: Arc<SimulatedChain>,
    pub machine: Arc<BountyStateMachine>,
    pub audit: Arc<MemoryAuditLog>,
    pub escrow: WalletAddress,
    pub funder: WalletAddress,
    pub treasury: WalletAddress,
}

pub fn claimant(name: &str) -> ClaimantId {
    ClaimantId::new(name).unwrap()
}

/// Deterministic wallet per claimant name
pub fn wallet_of(name: &str) -> WalletAddress {
    let mut bytes = [0u8; 32];
    for (i, b) in name.bytes().enumerate().take(32) {
        bytes[i] = b;
    }
    bytes[31] = 0xAA;
    WalletAddress::from_bytes(bytes)
}

pub fn admin() -> Actor {
    Actor::Admin("ops".to_string())
}

pub fn oracle() -> Actor {
    Actor::Automation("oracle".to_string())
}

pub fn verdict(score: u8) -> ReviewVerdict {
    ReviewVerdict::new(score, Recommendation::Approve, "meets the task", oracle())
}

pub fn submission(bounty: u64, author: &str, diff: &str) -> Submission {
    Submission {
        pr_number: 7,
        author: claimant(author),
        title: "Warm the cache before reads".to_string(),
        description: format!(
            "Warms the cache on first access so cold reads stop stalling.\nCloses #{}\nWallet: {}",
            bounty,
            wallet_of(author)
        ),
        diff: diff.to_string(),
        payout_wallet: None,
    }
}

pub async fn harness() -> Harness {
    harness_with(MachineConfig::default()).await
}

pub async fn harness_with(config: MachineConfig) -> Harness {
    let mint = WalletAddress::from_bytes([1u8; 32]);
    let treasury = WalletAddress::from_bytes([2u8; 32]);
    let funder = WalletAddress::from_bytes([9u8; 32]);
    let chain = Arc::new(SimulatedChain::new(mint));

    let mut ledger_config = LedgerConfig::new(mint, treasury);
    ledger_config.confirmation_timeout_ms = 200;
    ledger_config.poll_interval_ms = 10;
    let ledger = Arc::new(
        EscrowLedger::new(chain.clone(), EscrowAuthority::generate(), ledger_config).unwrap(),
    );
    let escrow = ledger.escrow_address();

    let audit = Arc::new(MemoryAuditLog::new());
    let machine = BountyStateMachine::new(
        Arc::new(MemoryRecordStore::new()),
        audit.clone(),
        Arc::new(SecurityGate::new(GateConfig::default())),
        ledger,
        config,
    );

    Harness {
        chain,
        machine: Arc::new(machine),
        audit,
        escrow,
        funder,
        treasury,
    }
}

impl Harness {
    pub async fn deposit(&self, from: WalletAddress, amount: u64, memo: &str) -> TxSignature {
        self.chain
            .deposit(from, self.escrow, TokenAmount::from_base_units(amount), Some(memo))
            .await
    }

    pub async fn fund(&self, id: u64, amount: u64) -> BountyRecord {
        let signature = self.deposit(self.funder, amount, &format!("b:{}", id)).await;
        self.machine
            .fund_bounty(
                BountyId::from(id),
                TokenAmount::from_base_units(amount),
                signature,
                self.funder,
                TaskSpec {
                    title: format!("Task {}", id),
                    labels: vec!["performance".to_string()],
                },
            )
            .await
            .unwrap()
    }

    pub async fn stake(&self, id: u64, name: &str, amount: u64) -> TxSignature {
        self.deposit(wallet_of(name), amount, &format!("claim:{}:{}", id, name))
            .await
    }

    /// Fund, stake and claim with the default 10% stake.
    pub async fn claimed(&self, id: u64, amount: u64, name: &str) {
        self.fund(id, amount).await;
        let stake = self.stake(id, name, amount / 10).await;
        self.machine
            .claim(&BountyId::from(id), &claimant(name), Some(stake), None)
            .await
            .unwrap();
    }

    /// Drive a bounty all the way to APPROVED.
    pub async fn approved(&self, id: u64, amount: u64, name: &str) {
        self.claimed(id, amount, name).await;
        let bounty = BountyId::from(id);
        self.machine
            .submit(&bounty, submission(id, name, CLEAN_DIFF))
            .await
            .unwrap();
        self.machine.record_review(&bounty, verdict(9)).await.unwrap();
        self.machine.approve(&bounty, &admin()).await.unwrap();
    }
}
