use bounty_types::{TxSignature, TypesError};
use thiserror::Error;

/// Failure reported by a [`ChainClient`](crate::chain::ChainClient).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The node could not be reached or did not answer; the request may or may not have landed
    #[error("Chain unavailable: {0}")]
    Unavailable(String),

    /// The chain refused the transaction; nothing was applied
    #[error("Transaction rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Chain unavailable: {0}")]
    ChainUnavailable(String),

    #[error("Chain call timed out: {0}")]
    Timeout(String),

    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("Transaction {signature} failed on chain: {reason}")]
    TransactionFailed {
        signature: TxSignature,
        reason: String,
    },

    /// Submitted but not yet confirmed; retry re-polls the same signature
    #[error("Transaction {signature} submitted but unconfirmed")]
    Unconfirmed { signature: TxSignature },

    #[error("Settlement journal error: {0}")]
    Journal(String),

    #[error("Invalid settlement request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Types(#[from] TypesError),
}

impl LedgerError {
    /// Everything except a malformed request is safe to retry: settlement is
    /// idempotent per bounty.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LedgerError::InvalidRequest(_) | LedgerError::Types(_))
    }

    /// Signature that may still land, if any. Retries must re-poll it.
    pub fn in_flight_signature(&self) -> Option<&TxSignature> {
        match self {
            LedgerError::Unconfirmed { signature } => Some(signature),
            _ => None,
        }
    }
}

impl From<ChainError> for LedgerError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::Unavailable(msg) => LedgerError::ChainUnavailable(msg),
            ChainError::Rejected(msg) => LedgerError::TransactionRejected(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
