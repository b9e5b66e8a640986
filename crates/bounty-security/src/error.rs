use crate::pause::PauseScope;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("Rate limited: {claimant} may submit again in {retry_after_secs}s")]
    RateLimited {
        claimant: String,
        retry_after_secs: i64,
    },

    #[error("Invalid format: {0}")]
    FormatInvalid(String),

    #[error("Security risk: {0}")]
    SecurityRisk(String),

    #[error("System paused: {0} are suspended")]
    SystemPaused(PauseScope),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,
}

pub type Result<T> = std::result::Result<T, GateError>;
