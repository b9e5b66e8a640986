use crate::oracle::ReviewVerdict;
use crate::state::BountyState;
use bounty_ledger::{PendingSettlement, SettlementReceipt};
use bounty_security::{Finding, ScanReport};
use bounty_types::{
    Actor, BountyId, ClaimantId, EscrowReference, Submission, TokenAmount, TxSignature,
    WalletAddress,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title and labels of the task a bounty pays for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub title: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakePolicy {
    /// Stake stays in escrow when the claim expires
    Forfeit,
    /// Stake is owed back to the claimant when the claim expires
    Return,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRecord {
    pub signature: TxSignature,
    pub reference: EscrowReference,
    pub amount: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub claimant: ClaimantId,
    pub payout_wallet: Option<WalletAddress>,
    pub stake: Option<StakeRecord>,
    pub claimed_at: DateTime<Utc>,
}

/// A claim that ended by expiry, kept for reputation and stake accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedClaim {
    pub claim: ClaimRecord,
    pub expired_at: DateTime<Utc>,
    pub stake_disposition: Option<StakePolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub pr_number: u64,
    pub diff_fingerprint: String,
    pub payout_wallet: WalletAddress,
    pub content: Submission,
    pub submitted_at: DateTime<Utc>,
}

/// Independent sign-off counted toward the double-approval gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSignal {
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Machine-readable reason code
    pub code: String,
    pub reason: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

/// Durable bounty record. Mutated only by the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BountyRecord {
    pub id: BountyId,
    pub amount: TokenAmount,
    pub escrow_reference: EscrowReference,
    pub funding_signature: TxSignature,
    /// Wallet refunds go back to
    pub funder: WalletAddress,
    pub task: TaskSpec,
    pub state: BountyState,
    pub claim: Option<ClaimRecord>,
    #[serde(default)]
    pub prior_claims: Vec<ArchivedClaim>,
    pub submission: Option<SubmissionRecord>,
    pub scan: Option<ScanReport>,
    pub review_verdict: Option<ReviewVerdict>,
    #[serde(default)]
    pub approvals: Vec<ApprovalSignal>,
    pub rejection: Option<Rejection>,
    pub pending_settlement: Option<PendingSettlement>,
    pub payout_receipt: Option<SettlementReceipt>,
    pub refund_receipt: Option<SettlementReceipt>,
    #[serde(default)]
    pub settlement_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Incremented by every committed write; used for compare-and-swap
    pub version: u64,
}

impl BountyRecord {
    pub fn new(
        id: BountyId,
        amount: TokenAmount,
        escrow_reference: EscrowReference,
        funding_signature: TxSignature,
        funder: WalletAddress,
        task: TaskSpec,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            amount,
            escrow_reference,
            funding_signature,
            funder,
            task,
            state: BountyState::Open,
            claim: None,
            prior_claims: Vec::new(),
            submission: None,
            scan: None,
            review_verdict: None,
            approvals: Vec::new(),
            rejection: None,
            pending_settlement: None,
            payout_receipt: None,
            refund_receipt: None,
            settlement_attempts: 0,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn claimant(&self) -> Option<&ClaimantId> {
        self.claim.as_ref().map(|c| &c.claimant)
    }

    /// Frozen once paid: nothing about amount, claimant or receipt may change.
    pub fn is_frozen(&self) -> bool {
        self.payout_receipt.is_some()
    }

    /// Wallet the payout goes to: the submission's, else the claim's.
    pub fn payout_wallet(&self) -> Option<WalletAddress> {
        self.submission
            .as_ref()
            .map(|s| s.payout_wallet)
            .or_else(|| self.claim.as_ref().and_then(|c| c.payout_wallet))
    }

    /// `payout_receipt` is present exactly when the bounty is paid.
    pub fn receipt_matches_state(&self) -> bool {
        self.payout_receipt.is_some() == (self.state == BountyState::Paid)
    }
}
