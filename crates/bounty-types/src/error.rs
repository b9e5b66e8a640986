use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("Invalid wallet address: {0}")]
    InvalidAddress(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid escrow reference: {0}")]
    InvalidReference(String),

    #[error("Invalid transaction signature: {0}")]
    InvalidSignature(String),

    #[error("Arithmetic overflow")]
    Overflow,
}

pub type Result<T> = std::result::Result<T, TypesError>;
