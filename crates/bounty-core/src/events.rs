use crate::oracle::ReviewVerdict;
use crate::state::BountyState;
use bounty_types::{Actor, BountyId, ClaimantId, Submission, TxSignature, WalletAddress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound events from the routing layer, dispatched by
/// [`BountyStateMachine::handle`](crate::BountyStateMachine::handle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BountyEvent {
    ClaimRequested {
        bounty_id: BountyId,
        claimant: ClaimantId,
        stake_signature: Option<TxSignature>,
        #[serde(default)]
        payout_wallet: Option<WalletAddress>,
    },
    SubmissionReceived {
        bounty_id: BountyId,
        submission: Submission,
    },
    ReviewCompleted {
        bounty_id: BountyId,
        verdict: ReviewVerdict,
    },
    AdminApproval {
        bounty_id: BountyId,
        actor: Actor,
    },
    AdminRefund {
        bounty_id: BountyId,
        actor: Actor,
    },
    AdminRejection {
        bounty_id: BountyId,
        actor: Actor,
        reason: String,
    },
}

impl BountyEvent {
    pub fn bounty_id(&self) -> &BountyId {
        match self {
            BountyEvent::ClaimRequested { bounty_id, .. }
            | BountyEvent::SubmissionReceived { bounty_id, .. }
            | BountyEvent::ReviewCompleted { bounty_id, .. }
            | BountyEvent::AdminApproval { bounty_id, .. }
            | BountyEvent::AdminRefund { bounty_id, .. }
            | BountyEvent::AdminRejection { bounty_id, .. } => bounty_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BountyEvent::ClaimRequested { .. } => "claim_requested",
            BountyEvent::SubmissionReceived { .. } => "submission_received",
            BountyEvent::ReviewCompleted { .. } => "review_completed",
            BountyEvent::AdminApproval { .. } => "admin_approval",
            BountyEvent::AdminRefund { .. } => "admin_refund",
            BountyEvent::AdminRejection { .. } => "admin_rejection",
        }
    }
}

/// Emitted after every committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub bounty_id: BountyId,
    pub from: Option<BountyState>,
    pub to: BountyState,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = BountyEvent::AdminRefund {
            bounty_id: BountyId::from(42),
            actor: Actor::Admin("ops".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "admin_refund");
        assert_eq!(json["bounty_id"], "42");

        let back: BountyEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.bounty_id(), &BountyId::from(42));
        assert_eq!(back.name(), "admin_refund");
    }
}
