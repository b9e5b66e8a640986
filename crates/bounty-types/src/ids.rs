use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_IDENTIFIER_LEN: usize = 64;

fn validate_identifier(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.len() > MAX_IDENTIFIER_LEN {
        return Err(TypesError::InvalidIdentifier(format!(
            "{} must be 1..={} characters",
            kind, MAX_IDENTIFIER_LEN
        )));
    }
    // ':' is the reference separator and must never appear inside a component
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(TypesError::InvalidIdentifier(format!(
            "{} '{}' contains characters outside [A-Za-z0-9._-]",
            kind, value
        )));
    }
    Ok(())
}

/// Stable bounty identifier, e.g. an issue number or slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BountyId(String);

impl BountyId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_identifier("bounty id", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for BountyId {
    fn from(number: u64) -> Self {
        Self(number.to_string())
    }
}

impl TryFrom<String> for BountyId {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BountyId> for String {
    fn from(id: BountyId) -> Self {
        id.0
    }
}

impl fmt::Display for BountyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of an agent claiming work (account handle, not the payout wallet).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClaimantId(String);

impl ClaimantId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_identifier("claimant id", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClaimantId {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ClaimantId> for String {
    fn from(id: ClaimantId) -> Self {
        id.0
    }
}

impl fmt::Display for ClaimantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Base58 encoded 64-byte transaction signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxSignature(String);

impl TxSignature {
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self(bs58::encode(bytes).into_string())
    }

    pub fn parse(signature: &str) -> Result<Self> {
        let decoded = bs58::decode(signature.trim())
            .into_vec()
            .map_err(|e| TypesError::InvalidSignature(e.to_string()))?;
        if decoded.len() != 64 {
            return Err(TypesError::InvalidSignature(format!(
                "decodes to {} bytes, expected 64",
                decoded.len()
            )));
        }
        Ok(Self(signature.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log fields.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who triggered a transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Actor {
    /// Scheduled or internal processing (expiry sweeps, payout worker)
    System,
    /// An automated reviewer or pipeline stage
    Automation(String),
    /// A human operator with administrative rights
    Admin(String),
    /// The agent doing the work
    Claimant(ClaimantId),
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin(_))
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::System => write!(f, "system"),
            Actor::Automation(name) => write!(f, "automation:{}", name),
            Actor::Admin(name) => write!(f, "admin:{}", name),
            Actor::Claimant(id) => write!(f, "claimant:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rules() {
        assert!(BountyId::new("42").is_ok());
        assert!(BountyId::new("fix-login_v2.1").is_ok());
        assert!(BountyId::new("").is_err());
        assert!(BountyId::new("a:b").is_err());
        assert!(ClaimantId::new("alice").is_ok());
        assert!(ClaimantId::new("al ice").is_err());
        assert!(ClaimantId::new("x".repeat(65)).is_err());
    }

    #[test]
    fn test_signature_parse() {
        let sig = TxSignature::from_bytes(&[5u8; 64]);
        assert_eq!(TxSignature::parse(sig.as_str()).unwrap(), sig);
        assert!(TxSignature::parse("abc").is_err());
        assert_eq!(sig.short().len(), 8);
    }

    #[test]
    fn test_actor_display() {
        assert_eq!(Actor::System.to_string(), "system");
        assert_eq!(Actor::Admin("ops".into()).to_string(), "admin:ops");
        assert!(Actor::Admin("ops".into()).is_admin());
        assert!(!Actor::Automation("reviewer".into()).is_admin());
    }
}
