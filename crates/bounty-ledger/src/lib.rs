//! # Escrow Ledger
//!
//! On-chain side of the bounty pipeline:
//!
//! - verifies funding and stake deposits by signature, exact memo and amount
//! - computes the worker / treasury split
//! - builds, signs and submits one all-or-nothing settlement transaction
//! - recovers in-flight settlements by re-polling their signature
//!
//! The chain itself sits behind [`ChainClient`]; [`SimulatedChain`] is an
//! in-memory implementation.

pub mod chain;
pub mod deposit;
pub mod error;
pub mod ledger;
pub mod simulated;
pub mod split;
pub mod transaction;

pub use chain::{Blockhash, ChainClient, ChainTransaction, TokenTransfer};
pub use deposit::{check_deposit, DepositCheck, DepositProof};
pub use error::{ChainError, LedgerError, Result};
pub use ledger::{
    EscrowLedger, LedgerConfig, PendingSettlement, SettlementJournal, SettlementKind,
    SettlementReceipt, SettlementRequest,
};
pub use simulated::{Fault, SimulatedChain};
pub use split::{PayoutSplit, SplitAmounts};
pub use transaction::{EscrowAuthority, LegRole, PayoutTransaction, SignedTransaction, TransferLeg};
