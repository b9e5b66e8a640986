use crate::state::BountyState;
use bounty_ledger::LedgerError;
use bounty_security::{GateError, PauseScope};
use bounty_types::{BountyId, TypesError};
use thiserror::Error;

/// Storage-layer failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record {0} already exists")]
    AlreadyExists(BountyId),

    #[error("Record {0} not found")]
    NotFound(BountyId),

    #[error("Version conflict on {id}: expected {expected}, found {found}")]
    Conflict {
        id: BountyId,
        expected: u64,
        found: u64,
    },

    #[error("Key {key} already reserved by {owner}")]
    Taken { key: String, owner: String },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Every rejection the state machine can return. Each variant carries a
/// stable [`reason_code`](BountyError::reason_code).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BountyError {
    #[error("Invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: BountyState,
        to: BountyState,
        reason: String,
    },

    #[error("Bounty {bounty_id} is already claimed by {holder}")]
    AlreadyClaimed { bounty_id: BountyId, holder: String },

    #[error("Bounty {bounty_id} is already paid (signature {signature})")]
    AlreadyPaid {
        bounty_id: BountyId,
        signature: String,
    },

    #[error("Bounty {0} not found")]
    NotFound(BountyId),

    #[error("Bounty {0} already exists")]
    DuplicateBounty(BountyId),

    #[error("Invalid format: {0}")]
    FormatInvalid(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: i64 },

    #[error("Security risk: {0}")]
    SecurityRisk(String),

    #[error("System paused: {0} are suspended")]
    SystemPaused(PauseScope),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Claimant {claimant} already holds {limit} active claims")]
    ClaimLimitExceeded { claimant: String, limit: usize },

    #[error("Review score {score} below threshold {threshold}")]
    ThresholdNotMet { score: u8, threshold: u8 },

    #[error("Deposit {signature} not found")]
    DepositNotFound { signature: String },

    #[error("Deposit {signature} not yet confirmed")]
    DepositUnconfirmed { signature: String },

    #[error("Deposit {signature} failed on chain: {reason}")]
    DepositFailed { signature: String, reason: String },

    #[error("Deposit amount mismatch: expected {expected}, received {received}")]
    AmountMismatch { expected: u64, received: u64 },

    #[error("Deposit reference mismatch: expected '{expected}', found {found:?}")]
    ReferenceMismatch {
        expected: String,
        found: Option<String>,
    },

    #[error("Deposit signature {0} was already used")]
    SignatureReused(String),

    #[error("Escrow reference {0} is already bound to another bounty")]
    DuplicateReference(String),

    #[error("Chain unavailable: {0}")]
    ChainUnavailable(String),

    #[error("Settlement failed: {reason}")]
    SettlementFailure { reason: String, retryable: bool },

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl BountyError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            BountyError::InvalidTransition { .. } => "invalid_transition",
            BountyError::AlreadyClaimed { .. } => "already_claimed",
            BountyError::AlreadyPaid { .. } => "already_paid",
            BountyError::NotFound(_) => "not_found",
            BountyError::DuplicateBounty(_) => "duplicate_bounty",
            BountyError::FormatInvalid(_) => "format_invalid",
            BountyError::RateLimited { .. } => "rate_limited",
            BountyError::SecurityRisk(_) => "security_risk",
            BountyError::SystemPaused(_) => "system_paused",
            BountyError::Unauthorized(_) => "unauthorized",
            BountyError::ClaimLimitExceeded { .. } => "claim_limit_exceeded",
            BountyError::ThresholdNotMet { .. } => "threshold_not_met",
            BountyError::DepositNotFound { .. } => "deposit_not_found",
            BountyError::DepositUnconfirmed { .. } => "deposit_unconfirmed",
            BountyError::DepositFailed { .. } => "deposit_failed",
            BountyError::AmountMismatch { .. } => "amount_mismatch",
            BountyError::ReferenceMismatch { .. } => "reference_mismatch",
            BountyError::SignatureReused(_) => "signature_reused",
            BountyError::DuplicateReference(_) => "duplicate_reference",
            BountyError::ChainUnavailable(_) => "chain_unavailable",
            BountyError::SettlementFailure { .. } => "settlement_failure",
            BountyError::PersistenceFailure(_) => "persistence_failure",
        }
    }

    /// Whether the same request may succeed later without the caller
    /// changing anything. Persistence failures are retryable only after the
    /// caller re-reads current state.
    pub fn is_retryable(&self) -> bool {
        match self {
            BountyError::RateLimited { .. }
            | BountyError::SystemPaused(_)
            | BountyError::DepositNotFound { .. }
            | BountyError::DepositUnconfirmed { .. }
            | BountyError::ChainUnavailable(_)
            | BountyError::PersistenceFailure(_) => true,
            BountyError::SettlementFailure { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Idempotency conflicts: the requested outcome already holds.
    pub fn is_success_adjacent(&self) -> bool {
        matches!(
            self,
            BountyError::AlreadyClaimed { .. } | BountyError::AlreadyPaid { .. }
        )
    }

    /// Ledger failure raised while paying out or refunding. An outage or
    /// timeout mid-settlement is a failed attempt to retry, not a chain
    /// availability error.
    pub(crate) fn settlement(e: LedgerError) -> Self {
        match e {
            LedgerError::ChainUnavailable(_) | LedgerError::Timeout(_) => {
                BountyError::SettlementFailure {
                    retryable: true,
                    reason: e.to_string(),
                }
            }
            other => other.into(),
        }
    }

    pub(crate) fn invalid(from: BountyState, to: BountyState, reason: impl Into<String>) -> Self {
        BountyError::InvalidTransition {
            from,
            to,
            reason: reason.into(),
        }
    }
}

impl From<GateError> for BountyError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::RateLimited {
                retry_after_secs, ..
            } => BountyError::RateLimited { retry_after_secs },
            GateError::FormatInvalid(msg) => BountyError::FormatInvalid(msg),
            GateError::SecurityRisk(msg) => BountyError::SecurityRisk(msg),
            GateError::SystemPaused(scope) => BountyError::SystemPaused(scope),
            GateError::Unauthorized(msg) => BountyError::Unauthorized(msg),
            GateError::InvalidWebhookSignature => {
                BountyError::Unauthorized("invalid webhook signature".to_string())
            }
        }
    }
}

impl From<StoreError> for BountyError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => BountyError::NotFound(id),
            StoreError::AlreadyExists(id) => BountyError::DuplicateBounty(id),
            other => BountyError::PersistenceFailure(other.to_string()),
        }
    }
}

impl From<LedgerError> for BountyError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::ChainUnavailable(msg) => BountyError::ChainUnavailable(msg),
            LedgerError::Timeout(msg) => BountyError::ChainUnavailable(format!("timeout: {msg}")),
            other => BountyError::SettlementFailure {
                retryable: other.is_retryable(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<TypesError> for BountyError {
    fn from(e: TypesError) -> Self {
        BountyError::FormatInvalid(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BountyError>;
