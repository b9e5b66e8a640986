//! # Bounty Security Gate
//!
//! Validators that run before any transition leading toward payment:
//!
//! - **Rate limiting**: rolling per-claimant submission window plus a payout cooldown
//! - **Format validation**: task reference, description, payout wallet
//! - **Dangerous-pattern scan**: execution sinks, secrets, protected paths, obfuscation
//! - **Emergency pause**: admin-only toggle checked under a read guard
//!
//! The gate can veto a transition but never mutates bounty state.

pub mod error;
pub mod events;
pub mod format;
pub mod gate;
pub mod pause;
pub mod rate_limit;
pub mod scanner;
pub mod webhook;

pub use error::{GateError, Result};
pub use events::{SecurityEvent, SecurityEventLog, SecuritySeverity};
pub use format::{
    extract_payout_wallet, extract_task_reference, validate_submission, FormatConfig,
    ValidatedSubmission,
};
pub use gate::{GateConfig, GateInput, SecurityGate};
pub use pause::{PauseChange, PauseFlags, PauseGuard, PauseScope, PauseSwitch};
pub use rate_limit::{check_rate, RateLimitConfig, RateLimiter, RateState};
pub use scanner::{CodeScanner, Finding, RiskCategory, ScanContext, ScanReport, ScannerConfig};
pub use webhook::{sign_webhook_body, verify_webhook_signature};
