use crate::chain::Blockhash;
use bounty_types::{EscrowReference, TokenAmount, TxSignature, WalletAddress};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegRole {
    Worker,
    Treasury,
    Refund,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLeg {
    pub recipient: WalletAddress,
    pub amount: TokenAmount,
    pub role: LegRole,
}

/// Unsigned payout: every leg moves `mint` out of the escrow authority's
/// account, and the whole set lands or fails together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutTransaction {
    pub authority: WalletAddress,
    pub mint: WalletAddress,
    pub recent_blockhash: Blockhash,
    pub memo: EscrowReference,
    pub legs: Vec<TransferLeg>,
}

impl PayoutTransaction {
    /// Canonical byte encoding covered by the signature.
    pub fn message_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.legs.len() * 40);
        out.extend_from_slice(self.authority.as_bytes());
        out.extend_from_slice(self.mint.as_bytes());
        for field in [self.recent_blockhash.as_str(), self.memo.as_str()] {
            out.extend_from_slice(&(field.len() as u32).to_le_bytes());
            out.extend_from_slice(field.as_bytes());
        }
        out.extend_from_slice(&(self.legs.len() as u32).to_le_bytes());
        for leg in &self.legs {
            out.extend_from_slice(leg.recipient.as_bytes());
            out.extend_from_slice(&leg.amount.base_units().to_le_bytes());
        }
        out
    }

    pub fn message_hash(&self) -> [u8; 32] {
        *blake3::hash(&self.message_bytes()).as_bytes()
    }

    pub fn total(&self) -> Option<TokenAmount> {
        self.legs
            .iter()
            .try_fold(TokenAmount::ZERO, |acc, leg| acc.checked_add(leg.amount))
    }
}

/// A payout transaction plus the escrow authority's signature over it.
/// Ed25519 is deterministic, so the signature is known before submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: PayoutTransaction,
    pub signature: TxSignature,
}

impl SignedTransaction {
    pub fn verify(&self) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(self.transaction.authority.as_bytes()) else {
            return false;
        };
        let Ok(raw) = bs58::decode(self.signature.as_str()).into_vec() else {
            return false;
        };
        let Ok(bytes) = <[u8; 64]>::try_from(raw.as_slice()) else {
            return false;
        };
        key.verify(&self.transaction.message_hash(), &Signature::from_bytes(&bytes))
            .is_ok()
    }
}

/// The escrow signing key. One per process; callers serialize its use.
pub struct EscrowAuthority {
    signing_key: SigningKey,
}

impl EscrowAuthority {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Escrow wallet controlled by this key.
    pub fn address(&self) -> WalletAddress {
        WalletAddress::from_bytes(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, transaction: PayoutTransaction) -> SignedTransaction {
        let signature = self.signing_key.sign(&transaction.message_hash());
        SignedTransaction {
            transaction,
            signature: TxSignature::from_bytes(&signature.to_bytes()),
        }
    }
}

impl std::fmt::Debug for EscrowAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EscrowAuthority({})", self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(authority: &EscrowAuthority) -> PayoutTransaction {
        PayoutTransaction {
            authority: authority.address(),
            mint: WalletAddress::from_bytes([1u8; 32]),
            recent_blockhash: Blockhash::from_bytes([2u8; 32]),
            memo: EscrowReference::parse("b:42").unwrap(),
            legs: vec![
                TransferLeg {
                    recipient: WalletAddress::from_bytes([3u8; 32]),
                    amount: TokenAmount::from_base_units(9_500),
                    role: LegRole::Worker,
                },
                TransferLeg {
                    recipient: WalletAddress::from_bytes([4u8; 32]),
                    amount: TokenAmount::from_base_units(500),
                    role: LegRole::Treasury,
                },
            ],
        }
    }

    #[test]
    fn test_signing_is_deterministic_and_verifiable() {
        let authority = EscrowAuthority::generate();
        let a = authority.sign(sample(&authority));
        let b = authority.sign(sample(&authority));
        assert_eq!(a.signature, b.signature);
        assert!(a.verify());
        assert_eq!(a.transaction.total(), Some(TokenAmount::from_base_units(10_000)));
    }

    #[test]
    fn test_tampering_breaks_signature() {
        let authority = EscrowAuthority::generate();
        let mut signed = authority.sign(sample(&authority));
        signed.transaction.legs[0].amount = TokenAmount::from_base_units(10_000);
        assert!(!signed.verify());
    }

    #[test]
    fn test_key_roundtrip() {
        let authority = EscrowAuthority::generate();
        let restored = EscrowAuthority::from_secret_bytes(&authority.secret_bytes());
        assert_eq!(restored.address(), authority.address());
    }
}
