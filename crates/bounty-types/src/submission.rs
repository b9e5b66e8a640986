use crate::ids::ClaimantId;
use serde::{Deserialize, Serialize};

/// Work submitted against a claimed bounty, as delivered by the routing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Pull request number of the artifact
    pub pr_number: u64,
    /// Account that authored the artifact
    pub author: ClaimantId,
    pub title: String,
    /// Pull request body; carries the task reference and payout wallet
    pub description: String,
    /// Unified diff of the proposed change
    pub diff: String,
    /// Explicit payout wallet, if not given in the description
    #[serde(default)]
    pub payout_wallet: Option<String>,
}

impl Submission {
    /// blake3 fingerprint of the diff, hex encoded.
    pub fn diff_fingerprint(&self) -> String {
        hex::encode(blake3::hash(self.diff.as_bytes()).as_bytes())
    }
}
