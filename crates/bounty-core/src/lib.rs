//! # Bounty Core
//!
//! Lifecycle state machine for escrow-backed bounties:
//!
//! ```text
//! OPEN -> CLAIMED -> SUBMITTED -> REVIEWED -> APPROVED -> PAID
//! ```
//!
//! with side branches to REJECTED, REFUNDED and EXPIRED. Every transition
//! is serialized per bounty, committed with compare-and-swap and appended
//! to the audit log. Funds only move through
//! [`EscrowLedger`](bounty_ledger::EscrowLedger), and every crossing toward
//! payment passes the [`SecurityGate`](bounty_security::SecurityGate).

pub mod audit;
pub mod config;
pub mod error;
pub mod events;
pub mod locks;
pub mod machine;
pub mod oracle;
pub mod queue;
pub mod record;
pub mod state;
pub mod store;

pub use audit::{AuditEntry, AuditLog, FileAuditLog, MemoryAuditLog};
pub use config::MachineConfig;
pub use error::{BountyError, Result, StoreError};
pub use events::{BountyEvent, TransitionEvent};
pub use machine::BountyStateMachine;
pub use oracle::{parse_verdict, OracleError, Recommendation, ReviewOracle, ReviewVerdict, MAX_SCORE};
pub use queue::{OperatorQueue, QueuedSettlement};
pub use record::{
    ApprovalSignal, ArchivedClaim, BountyRecord, ClaimRecord, Rejection, StakePolicy, StakeRecord,
    SubmissionRecord, TaskSpec,
};
pub use state::BountyState;
pub use store::{MemoryRecordStore, RecordStore, StoreResult};
#[cfg(feature = "rocksdb")]
pub use store::RocksDbRecordStore;
