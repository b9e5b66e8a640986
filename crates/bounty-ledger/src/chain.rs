use crate::error::ChainError;
use crate::transaction::SignedTransaction;
use async_trait::async_trait;
use bounty_types::{TokenAmount, TxSignature, WalletAddress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Recent block hash a transaction is built against; it bounds how long the
/// transaction stays valid for inclusion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blockhash(String);

impl Blockhash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bs58::encode(bytes).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One token movement inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub source: WalletAddress,
    pub destination: WalletAddress,
    pub mint: WalletAddress,
    pub amount: TokenAmount,
}

/// A transaction as observed on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub signature: TxSignature,
    /// `None` until the transaction is confirmed
    pub block_time: Option<DateTime<Utc>>,
    /// Execution error, if the transaction landed but failed
    pub error: Option<String>,
    pub memo: Option<String>,
    pub transfers: Vec<TokenTransfer>,
}

impl ChainTransaction {
    pub fn is_confirmed(&self) -> bool {
        self.block_time.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Total of `mint` received by `destination` in this transaction.
    pub fn received_by(&self, destination: &WalletAddress, mint: &WalletAddress) -> TokenAmount {
        let total = self
            .transfers
            .iter()
            .filter(|t| &t.destination == destination && &t.mint == mint)
            .fold(0u128, |acc, t| acc + t.amount.base_units() as u128);
        TokenAmount::from_base_units(u64::try_from(total).unwrap_or(u64::MAX))
    }
}

/// Narrow view of the settlement chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Fetch a transaction by signature; `None` when the chain has never seen it
    async fn get_transaction(
        &self,
        signature: &TxSignature,
    ) -> std::result::Result<Option<ChainTransaction>, ChainError>;

    async fn latest_blockhash(&self) -> std::result::Result<Blockhash, ChainError>;

    /// Submit a signed transaction, returning its signature once accepted for processing
    async fn submit(
        &self,
        transaction: &SignedTransaction,
    ) -> std::result::Result<TxSignature, ChainError>;
}
