use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a bounty.
///
/// ```text
/// OPEN -> CLAIMED -> SUBMITTED -> REVIEWED -> APPROVED -> PAID
///   |        |           |            |
///   |        |           +------------+--> REJECTED
///   +--------+--> REFUNDED
///            +--> EXPIRED --(relist)--> OPEN
///                    +--> REFUNDED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BountyState {
    Open,
    Claimed,
    Submitted,
    Reviewed,
    Approved,
    Paid,
    Rejected,
    Refunded,
    Expired,
}

impl BountyState {
    /// No further work happens on the record in this state. `Expired`
    /// ends its claim; the bounty itself may still be relisted or refunded.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BountyState::Paid | BountyState::Rejected | BountyState::Refunded | BountyState::Expired
        )
    }

    /// Terminal and frozen for good.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            BountyState::Paid | BountyState::Rejected | BountyState::Refunded
        )
    }

    pub fn can_transition_to(&self, next: &BountyState) -> bool {
        use BountyState::*;
        matches!(
            (self, next),
            (Open, Claimed)
                | (Open, Refunded)
                | (Claimed, Submitted)
                | (Claimed, Expired)
                | (Claimed, Refunded)
                | (Submitted, Reviewed)
                | (Submitted, Rejected)
                | (Reviewed, Approved)
                | (Reviewed, Rejected)
                | (Approved, Paid)
                | (Expired, Open)
                | (Expired, Refunded)
        )
    }

    /// States in which a claimant holds an active claim.
    pub fn holds_claim(&self) -> bool {
        matches!(
            self,
            BountyState::Claimed
                | BountyState::Submitted
                | BountyState::Reviewed
                | BountyState::Approved
        )
    }
}

impl fmt::Display for BountyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BountyState::Open => "OPEN",
            BountyState::Claimed => "CLAIMED",
            BountyState::Submitted => "SUBMITTED",
            BountyState::Reviewed => "REVIEWED",
            BountyState::Approved => "APPROVED",
            BountyState::Paid => "PAID",
            BountyState::Rejected => "REJECTED",
            BountyState::Refunded => "REFUNDED",
            BountyState::Expired => "EXPIRED",
        };
        write!(f, "{}", name)
    }
}
