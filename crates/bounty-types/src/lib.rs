//! Value types shared by every crate of the bounty escrow pipeline.
//!
//! Amounts are integers in the smallest token unit, wallets are 32-byte
//! keys rendered in base58, and escrow references are the memo strings
//! that bind an on-chain deposit to exactly one bounty or claim.

pub mod address;
pub mod amount;
pub mod error;
pub mod ids;
pub mod reference;
pub mod submission;

pub use address::WalletAddress;
pub use amount::{TokenAmount, BPS_DENOMINATOR};
pub use error::{Result, TypesError};
pub use ids::{Actor, BountyId, ClaimantId, TxSignature};
pub use reference::{EscrowReference, ReferenceKind};
pub use submission::Submission;
