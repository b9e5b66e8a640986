use crate::error::{Result, TypesError};
use crate::ids::{BountyId, ClaimantId};
use serde::{Deserialize, Serialize};
use std::fmt;

const CLAIM_PREFIX: &str = "claim:";
const REFUND_PREFIX: &str = "refund:";
const MAX_REFERENCE_LEN: usize = 128;

/// Namespace a reference belongs to. The namespaces never overlap, so a
/// stake deposit can never be presented as a settlement deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Settlement,
    Claim,
    Refund,
}

/// Memo string binding an on-chain transfer to one purpose.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EscrowReference(String);

impl EscrowReference {
    /// Settlement reference `<namespace>:<bounty_id>`, e.g. `b:42`.
    pub fn settlement(namespace: &str, bounty_id: &BountyId) -> Result<Self> {
        if namespace.is_empty()
            || namespace == "claim"
            || namespace == "refund"
            || !namespace.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(TypesError::InvalidReference(format!(
                "'{}' is not a usable settlement namespace",
                namespace
            )));
        }
        Self::parse(&format!("{}:{}", namespace, bounty_id))
    }

    /// Stake reference `claim:<bounty_id>:<claimant>`.
    pub fn claim(bounty_id: &BountyId, claimant: &ClaimantId) -> Self {
        Self(format!("{}{}:{}", CLAIM_PREFIX, bounty_id, claimant))
    }

    /// Refund memo derived from the settlement reference it releases.
    pub fn refund(settlement: &EscrowReference) -> Self {
        Self(format!("{}{}", REFUND_PREFIX, settlement.0))
    }

    pub fn parse(reference: &str) -> Result<Self> {
        if reference.is_empty() || reference.len() > MAX_REFERENCE_LEN {
            return Err(TypesError::InvalidReference(format!(
                "length must be 1..={}",
                MAX_REFERENCE_LEN
            )));
        }
        if !reference.chars().all(|c| c.is_ascii_graphic()) {
            return Err(TypesError::InvalidReference(
                "only printable ASCII without whitespace is allowed".to_string(),
            ));
        }
        Ok(Self(reference.to_string()))
    }

    pub fn kind(&self) -> ReferenceKind {
        if self.0.starts_with(CLAIM_PREFIX) {
            ReferenceKind::Claim
        } else if self.0.starts_with(REFUND_PREFIX) {
            ReferenceKind::Refund
        } else {
            ReferenceKind::Settlement
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EscrowReference {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<EscrowReference> for String {
    fn from(reference: EscrowReference) -> Self {
        reference.0
    }
}

impl fmt::Display for EscrowReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
