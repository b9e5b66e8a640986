//! Structural validation of incoming submissions.

use crate::error::{GateError, Result};
use bounty_types::{BountyId, Submission, WalletAddress};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TASK_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:closes|fixes|resolves)\s+#([A-Za-z0-9._-]+)")
        .expect("invalid task reference pattern")
});

static WALLET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\*\*Payout Wallet\*\*:\s*`?([1-9A-HJ-NP-Za-km-z]{32,44})`?",
        r"(?i)(?:payout\s+)?wallet:\s*`?([1-9A-HJ-NP-Za-km-z]{32,44})`?",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid wallet pattern"))
    .collect()
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormatConfig {
    #[serde(default = "default_min_description_len")]
    pub min_description_len: usize,
    #[serde(default = "default_true")]
    pub require_task_reference: bool,
    #[serde(default = "default_true")]
    pub require_payout_wallet: bool,
}

fn default_min_description_len() -> usize {
    50
}

fn default_true() -> bool {
    true
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            min_description_len: default_min_description_len(),
            require_task_reference: true,
            require_payout_wallet: true,
        }
    }
}

/// Fields extracted from a submission that passed format validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub pr_number: u64,
    pub task_reference: Option<String>,
    pub payout_wallet: Option<WalletAddress>,
}

/// First `Closes #N` / `Fixes #N` / `Resolves #N` reference in the text.
pub fn extract_task_reference(text: &str) -> Option<String> {
    TASK_REFERENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .filter(|r| !r.is_empty())
}

/// Wallet given as `**Payout Wallet**: <addr>` or `Wallet: <addr>`.
pub fn extract_payout_wallet(text: &str) -> Option<String> {
    WALLET_PATTERNS
        .iter()
        .find_map(|re| re.captures(text).and_then(|c| c.get(1)))
        .map(|m| m.as_str().to_string())
}

/// Validate a submission for `bounty_id`. `fallback_wallet` is the wallet
/// supplied at claim time, used when the submission names none.
pub fn validate_submission(
    submission: &Submission,
    bounty_id: &BountyId,
    fallback_wallet: Option<&WalletAddress>,
    config: &FormatConfig,
) -> Result<ValidatedSubmission> {
    if submission.pr_number == 0 {
        return Err(GateError::FormatInvalid(
            "missing pull request number".to_string(),
        ));
    }
    if submission.title.trim().is_empty() {
        return Err(GateError::FormatInvalid("empty title".to_string()));
    }

    let description = submission.description.trim();
    if description.chars().count() < config.min_description_len {
        return Err(GateError::FormatInvalid(format!(
            "description must be at least {} characters",
            config.min_description_len
        )));
    }
    if submission.diff.trim().is_empty() {
        return Err(GateError::FormatInvalid("empty diff".to_string()));
    }

    let task_reference = extract_task_reference(description);
    match &task_reference {
        Some(reference) if reference != bounty_id.as_str() => {
            return Err(GateError::FormatInvalid(format!(
                "submission references task #{} but was filed against bounty {}",
                reference, bounty_id
            )));
        }
        None if config.require_task_reference => {
            return Err(GateError::FormatInvalid(format!(
                "description must reference the task (e.g. 'Closes #{}')",
                bounty_id
            )));
        }
        _ => {}
    }

    let declared = submission
        .payout_wallet
        .clone()
        .or_else(|| extract_payout_wallet(description));
    let payout_wallet = match declared {
        Some(raw) => Some(
            WalletAddress::parse(&raw)
                .map_err(|e| GateError::FormatInvalid(format!("payout wallet: {}", e)))?,
        ),
        None => fallback_wallet.copied(),
    };
    if payout_wallet.is_none() && config.require_payout_wallet {
        return Err(GateError::FormatInvalid(
            "no payout wallet supplied".to_string(),
        ));
    }

    Ok(ValidatedSubmission {
        pr_number: submission.pr_number,
        task_reference,
        payout_wallet,
    })
}
