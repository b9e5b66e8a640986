use crate::chain::ChainTransaction;
use bounty_types::{EscrowReference, TokenAmount, TxSignature, WalletAddress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Proof that a deposit landed with the expected reference and amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositProof {
    pub signature: TxSignature,
    pub reference: EscrowReference,
    pub received: TokenAmount,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositCheck {
    Confirmed(DepositProof),
    NotFound,
    /// Landed but execution failed
    Failed { reason: String },
    /// Seen but not yet confirmed; may confirm later
    Unconfirmed,
    ReferenceMismatch {
        expected: EscrowReference,
        found: Option<String>,
    },
    AmountMismatch {
        expected: TokenAmount,
        received: TokenAmount,
    },
}

impl DepositCheck {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, DepositCheck::Confirmed(_))
    }
}

/// Judge a fetched transaction against the expected deposit. The memo must
/// equal `expected_reference` exactly; the escrow wallet must receive at
/// least `expected_amount` of `mint`.
pub fn check_deposit(
    transaction: Option<&ChainTransaction>,
    expected_reference: &EscrowReference,
    expected_amount: TokenAmount,
    escrow: &WalletAddress,
    mint: &WalletAddress,
) -> DepositCheck {
    let Some(tx) = transaction else {
        return DepositCheck::NotFound;
    };

    if let Some(reason) = &tx.error {
        return DepositCheck::Failed {
            reason: reason.clone(),
        };
    }

    let Some(confirmed_at) = tx.block_time else {
        return DepositCheck::Unconfirmed;
    };

    if tx.memo.as_deref() != Some(expected_reference.as_str()) {
        return DepositCheck::ReferenceMismatch {
            expected: expected_reference.clone(),
            found: tx.memo.clone(),
        };
    }

    let received = tx.received_by(escrow, mint);
    if received < expected_amount {
        return DepositCheck::AmountMismatch {
            expected: expected_amount,
            received,
        };
    }

    DepositCheck::Confirmed(DepositProof {
        signature: tx.signature.clone(),
        reference: expected_reference.clone(),
        received,
        confirmed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TokenTransfer;

    fn escrow() -> WalletAddress {
        WalletAddress::from_bytes([1u8; 32])
    }

    fn mint() -> WalletAddress {
        WalletAddress::from_bytes([2u8; 32])
    }

    fn tx(memo: Option<&str>, amount: u64) -> ChainTransaction {
        ChainTransaction {
            signature: TxSignature::from_bytes(&[9u8; 64]),
            block_time: Some(Utc::now()),
            error: None,
            memo: memo.map(str::to_string),
            transfers: vec![TokenTransfer {
                source: WalletAddress::from_bytes([5u8; 32]),
                destination: escrow(),
                mint: mint(),
                amount: TokenAmount::from_base_units(amount),
            }],
        }
    }

    fn reference() -> EscrowReference {
        EscrowReference::parse("b:42").unwrap()
    }

    fn check(t: Option<&ChainTransaction>) -> DepositCheck {
        check_deposit(t, &reference(), TokenAmount::from_base_units(10_000), &escrow(), &mint())
    }

    #[test]
    fn test_confirmed() {
        assert!(check(Some(&tx(Some("b:42"), 10_000))).is_confirmed());
        // Overfunding is still a valid deposit
        assert!(check(Some(&tx(Some("b:42"), 12_000))).is_confirmed());
    }

    #[test]
    fn test_reference_must_match_exactly() {
        for memo in [Some("b:420"), Some("B:42"), Some(" b:42"), None] {
            assert!(matches!(
                check(Some(&tx(memo, 10_000))),
                DepositCheck::ReferenceMismatch { .. }
            ));
        }
    }

    #[test]
    fn test_amount_and_destination() {
        assert!(matches!(
            check(Some(&tx(Some("b:42"), 9_999))),
            DepositCheck::AmountMismatch { .. }
        ));

        let mut elsewhere = tx(Some("b:42"), 10_000);
        elsewhere.transfers[0].destination = WalletAddress::from_bytes([7u8; 32]);
        assert!(matches!(
            check(Some(&elsewhere)),
            DepositCheck::AmountMismatch { received, .. } if received.is_zero()
        ));

        let mut wrong_mint = tx(Some("b:42"), 10_000);
        wrong_mint.transfers[0].mint = WalletAddress::from_bytes([8u8; 32]);
        assert!(!check(Some(&wrong_mint)).is_confirmed());
    }

    #[test]
    fn test_not_found_failed_unconfirmed() {
        assert_eq!(check(None), DepositCheck::NotFound);

        let mut failed = tx(Some("b:42"), 10_000);
        failed.error = Some("InstructionError".to_string());
        assert!(matches!(check(Some(&failed)), DepositCheck::Failed { .. }));

        let mut pending = tx(Some("b:42"), 10_000);
        pending.block_time = None;
        assert_eq!(check(Some(&pending)), DepositCheck::Unconfirmed);
    }
}
