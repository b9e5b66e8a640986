use crate::record::StakePolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MachineConfig {
    /// Prefix of settlement references (`<namespace>:<bounty_id>`)
    #[serde(default = "default_namespace")]
    pub settlement_namespace: String,
    /// Minimum oracle score (0..=10) for approval
    #[serde(default = "default_threshold")]
    pub approval_threshold: u8,
    /// Require a second, independent approval before funds move
    #[serde(default = "default_true")]
    pub require_double_approval: bool,
    /// Move below-threshold verdicts straight to REJECTED
    #[serde(default = "default_true")]
    pub auto_reject_below_threshold: bool,
    #[serde(default = "default_true")]
    pub require_stake: bool,
    /// Stake as a share of the bounty amount, in basis points
    #[serde(default = "default_stake_bps")]
    pub stake_bps: u64,
    #[serde(default = "default_claim_deadline_secs")]
    pub claim_deadline_secs: u64,
    /// Active claims one claimant may hold across all bounties
    #[serde(default = "default_max_active_claims")]
    pub max_active_claims: usize,
    #[serde(default = "default_stake_policy")]
    pub stake_policy: StakePolicy,
    /// Automatic settlement attempts before a bounty waits for an operator
    #[serde(default = "default_max_settlement_attempts")]
    pub max_settlement_attempts: u32,
}

fn default_namespace() -> String {
    "b".to_string()
}

fn default_threshold() -> u8 {
    8
}

fn default_true() -> bool {
    true
}

fn default_stake_bps() -> u64 {
    1_000
}

fn default_claim_deadline_secs() -> u64 {
    7 * 24 * 3600
}

fn default_max_active_claims() -> usize {
    3
}

fn default_stake_policy() -> StakePolicy {
    StakePolicy::Forfeit
}

fn default_max_settlement_attempts() -> u32 {
    5
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            settlement_namespace: default_namespace(),
            approval_threshold: default_threshold(),
            require_double_approval: true,
            auto_reject_below_threshold: true,
            require_stake: true,
            stake_bps: default_stake_bps(),
            claim_deadline_secs: default_claim_deadline_secs(),
            max_active_claims: default_max_active_claims(),
            stake_policy: default_stake_policy(),
            max_settlement_attempts: default_max_settlement_attempts(),
        }
    }
}
