use crate::audit::{AuditEntry, AuditLog};
use crate::config::MachineConfig;
use crate::error::{BountyError, Result, StoreError};
use crate::events::{BountyEvent, TransitionEvent};
use crate::locks::RecordLocks;
use crate::oracle::{parse_verdict, Recommendation, ReviewOracle, ReviewVerdict};
use crate::queue::OperatorQueue;
use crate::record::{
    ApprovalSignal, ArchivedClaim, BountyRecord, ClaimRecord, Rejection, StakeRecord,
    SubmissionRecord, TaskSpec,
};
use crate::state::BountyState;
use crate::store::{reference_key, signature_key, RecordStore};
use async_trait::async_trait;
use bounty_ledger::{
    DepositCheck, DepositProof, EscrowLedger, LedgerError, PendingSettlement, SettlementJournal,
    SettlementKind, SettlementReceipt, SettlementRequest,
};
use bounty_security::{GateInput, PauseChange, PauseScope, SecurityGate};
use bounty_types::{
    Actor, BountyId, ClaimantId, EscrowReference, Submission, TokenAmount, TxSignature,
    WalletAddress,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// One audited state change inside a commit.
struct Step {
    from: Option<BountyState>,
    to: BountyState,
    reason: String,
}

/// Move `record` to `to` if the lifecycle graph allows it.
fn advance(record: &mut BountyRecord, to: BountyState, reason: impl Into<String>) -> Result<Step> {
    if let Some(receipt) = &record.payout_receipt {
        return Err(BountyError::AlreadyPaid {
            bounty_id: record.id.clone(),
            signature: receipt.signature.to_string(),
        });
    }
    let from = record.state;
    if !from.can_transition_to(&to) {
        return Err(BountyError::invalid(from, to, "not an edge of the lifecycle graph"));
    }
    record.state = to;
    Ok(Step {
        from: Some(from),
        to,
        reason: reason.into(),
    })
}

fn accept_deposit(check: DepositCheck, signature: &TxSignature) -> Result<DepositProof> {
    match check {
        DepositCheck::Confirmed(proof) => Ok(proof),
        DepositCheck::NotFound => Err(BountyError::DepositNotFound {
            signature: signature.to_string(),
        }),
        DepositCheck::Failed { reason } => Err(BountyError::DepositFailed {
            signature: signature.to_string(),
            reason,
        }),
        DepositCheck::Unconfirmed => Err(BountyError::DepositUnconfirmed {
            signature: signature.to_string(),
        }),
        DepositCheck::ReferenceMismatch { expected, found } => Err(BountyError::ReferenceMismatch {
            expected: expected.to_string(),
            found,
        }),
        DepositCheck::AmountMismatch { expected, received } => Err(BountyError::AmountMismatch {
            expected: expected.base_units(),
            received: received.base_units(),
        }),
    }
}

/// Journals in-flight settlements into the record itself. Used only while
/// the caller holds the record lock.
struct RecordJournal<'a> {
    store: &'a dyn RecordStore,
    bounty_id: &'a BountyId,
}

impl RecordJournal<'_> {
    async fn update<F>(&self, apply: F) -> bounty_ledger::Result<()>
    where
        F: FnOnce(&mut BountyRecord) + Send,
    {
        let journal_err = |e: StoreError| LedgerError::Journal(e.to_string());
        let mut record = self
            .store
            .get(self.bounty_id)
            .await
            .map_err(journal_err)?
            .ok_or_else(|| LedgerError::Journal(format!("record {} vanished", self.bounty_id)))?;
        apply(&mut record);
        record.updated_at = Utc::now();
        self.store
            .compare_and_swap(&record)
            .await
            .map_err(journal_err)?;
        Ok(())
    }
}

#[async_trait]
impl<'a> SettlementJournal for RecordJournal<'a> {
    async fn record_pending(&self, pending: &PendingSettlement) -> bounty_ledger::Result<()> {
        let pending = pending.clone();
        self.update(move |record| record.pending_settlement = Some(pending))
            .await
    }

    async fn clear_pending(&self, signature: &TxSignature) -> bounty_ledger::Result<()> {
        let signature = signature.clone();
        self.update(move |record| {
            if record
                .pending_settlement
                .as_ref()
                .is_some_and(|p| p.signature == signature)
            {
                record.pending_settlement = None;
            }
        })
        .await
    }
}

/// Owns every bounty record transition.
///
/// Each operation takes the per-record lock, re-reads the record, checks
/// its preconditions and commits with compare-and-swap before appending
/// the audit entry. Chain reads (deposit checks) happen before the lock is
/// taken and their results are passed in already resolved. Settlement runs
/// under the record lock, bounded by the ledger's RPC and confirmation
/// timeouts, so no other transition can interleave with a payout.
pub struct BountyStateMachine {
    store: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditLog>,
    gate: Arc<SecurityGate>,
    ledger: Arc<EscrowLedger>,
    config: MachineConfig,
    locks: RecordLocks,
    queue: OperatorQueue,
    events: Option<mpsc::UnboundedSender<TransitionEvent>>,
}

impl BountyStateMachine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        audit: Arc<dyn AuditLog>,
        gate: Arc<SecurityGate>,
        ledger: Arc<EscrowLedger>,
        config: MachineConfig,
    ) -> Self {
        Self {
            store,
            audit,
            gate,
            ledger,
            config,
            locks: RecordLocks::new(),
            queue: OperatorQueue::new(),
            events: None,
        }
    }

    /// Publish a [`TransitionEvent`] for every committed transition.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<TransitionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn gate(&self) -> &SecurityGate {
        &self.gate
    }

    pub fn ledger(&self) -> &EscrowLedger {
        &self.ledger
    }

    pub fn queue(&self) -> &OperatorQueue {
        &self.queue
    }

    pub async fn get(&self, id: &BountyId) -> Result<BountyRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| BountyError::NotFound(id.clone()))
    }

    pub async fn list(&self) -> Result<Vec<BountyRecord>> {
        Ok(self.store.list().await?)
    }

    pub async fn audit_trail(&self, id: &BountyId) -> Result<Vec<AuditEntry>> {
        Ok(self.audit.entries_for(id).await?)
    }

    /// Write `record` and then its audit entries. A failed audit append after
    /// a committed write is reported as a persistence failure; the caller
    /// must re-read before retrying.
    async fn commit(
        &self,
        mut record: BountyRecord,
        actor: &Actor,
        steps: Vec<Step>,
    ) -> Result<BountyRecord> {
        record.updated_at = Utc::now();
        let written = self.store.compare_and_swap(&record).await?;

        for step in steps {
            let entry = AuditEntry::transition(&written.id, step.from, step.to, actor, &step.reason);
            if let Err(e) = self.audit.append(entry).await {
                error!(
                    bounty_id = %written.id,
                    to = %step.to,
                    error = %e,
                    "Audit append failed after commit"
                );
                return Err(e.into());
            }
            info!(
                bounty_id = %written.id,
                from = ?step.from,
                to = %step.to,
                actor = %actor,
                reason = %step.reason,
                "State transition"
            );
            if let Some(tx) = &self.events {
                // A dropped receiver only means nobody is listening
                let _ = tx.send(TransitionEvent {
                    bounty_id: written.id.clone(),
                    from: step.from,
                    to: step.to,
                    actor: actor.clone(),
                    at: written.updated_at,
                });
            }
        }
        Ok(written)
    }

    /// Dispatch an inbound event to its transition.
    pub async fn handle(&self, event: BountyEvent) -> Result<BountyState> {
        debug!(event = event.name(), bounty_id = %event.bounty_id(), "Handling event");
        match event {
            BountyEvent::ClaimRequested {
                bounty_id,
                claimant,
                stake_signature,
                payout_wallet,
            } => {
                self.claim(&bounty_id, &claimant, stake_signature, payout_wallet)
                    .await
            }
            BountyEvent::SubmissionReceived {
                bounty_id,
                submission,
            } => self.submit(&bounty_id, submission).await,
            BountyEvent::ReviewCompleted { bounty_id, verdict } => {
                self.record_review(&bounty_id, verdict).await
            }
            BountyEvent::AdminApproval { bounty_id, actor } => {
                self.approve(&bounty_id, &actor).await
            }
            BountyEvent::AdminRefund { bounty_id, actor } => {
                self.refund(&bounty_id, &actor).await?;
                Ok(BountyState::Refunded)
            }
            BountyEvent::AdminRejection {
                bounty_id,
                actor,
                reason,
            } => self.reject(&bounty_id, &actor, &reason).await,
        }
    }

    /// Create an OPEN record once the funding deposit is confirmed on chain
    /// under the bounty's settlement reference.
    pub async fn fund_bounty(
        &self,
        id: BountyId,
        amount: TokenAmount,
        funding_signature: TxSignature,
        funder: WalletAddress,
        task: TaskSpec,
    ) -> Result<BountyRecord> {
        if amount.is_zero() {
            return Err(BountyError::FormatInvalid("bounty amount must be positive".to_string()));
        }
        let reference = EscrowReference::settlement(&self.config.settlement_namespace, &id)?;
        if self.store.get(&id).await?.is_some() {
            return Err(BountyError::DuplicateBounty(id));
        }

        let check = self
            .ledger
            .verify_deposit(&reference, amount, &funding_signature)
            .await?;
        let proof = accept_deposit(check, &funding_signature)?;

        let _lock = self.locks.acquire(&id).await;
        let owner = format!("bounty:{}", id);
        let ref_key = reference_key(reference.as_str());
        let sig_key = signature_key(funding_signature.as_str());

        self.store
            .reserve(&ref_key, &owner)
            .await
            .map_err(|e| match e {
                StoreError::Taken { .. } => BountyError::DuplicateReference(reference.to_string()),
                other => other.into(),
            })?;
        if let Err(e) = self.store.reserve(&sig_key, &owner).await {
            self.release_quietly(&ref_key, &owner).await;
            return Err(match e {
                StoreError::Taken { .. } => {
                    BountyError::SignatureReused(funding_signature.to_string())
                }
                other => other.into(),
            });
        }

        let record = BountyRecord::new(
            id.clone(),
            amount,
            reference.clone(),
            funding_signature,
            funder,
            task,
            Utc::now(),
        );
        let written = match self.store.insert(&record).await {
            Ok(written) => written,
            Err(e) => {
                self.release_quietly(&sig_key, &owner).await;
                self.release_quietly(&ref_key, &owner).await;
                return Err(e.into());
            }
        };

        let entry = AuditEntry::transition(
            &id,
            None,
            BountyState::Open,
            &Actor::System,
            format!("funded with {} (received {})", amount, proof.received),
        );
        self.audit.append(entry).await?;
        if let Some(tx) = &self.events {
            let _ = tx.send(TransitionEvent {
                bounty_id: id.clone(),
                from: None,
                to: BountyState::Open,
                actor: Actor::System,
                at: written.created_at,
            });
        }

        info!(
            bounty_id = %id,
            reference = %reference,
            amount = amount.base_units(),
            "💰 Bounty funded"
        );
        Ok(written)
    }

    async fn release_quietly(&self, key: &str, owner: &str) {
        if let Err(e) = self.store.release(key, owner).await {
            warn!(key, owner, error = %e, "Failed to release reservation");
        }
    }

    /// OPEN (or EXPIRED, relisting it) -> CLAIMED.
    pub async fn claim(
        &self,
        id: &BountyId,
        claimant: &ClaimantId,
        stake_signature: Option<TxSignature>,
        payout_wallet: Option<WalletAddress>,
    ) -> Result<BountyState> {
        let snapshot = self.get(id).await?;
        Self::ensure_claimable(&snapshot)?;

        // Stake verification is a chain read and runs before the lock
        let stake = if self.config.require_stake {
            let signature = stake_signature.ok_or_else(|| {
                BountyError::FormatInvalid("a claim stake signature is required".to_string())
            })?;
            let expected = snapshot.amount.mul_bps_floor(self.config.stake_bps)?;
            let reference = EscrowReference::claim(id, claimant);
            let check = self
                .ledger
                .verify_deposit(&reference, expected, &signature)
                .await?;
            let proof = accept_deposit(check, &signature)?;
            Some(StakeRecord {
                signature,
                reference,
                amount: proof.received,
            })
        } else {
            None
        };

        let _lock = self.locks.acquire(id).await;
        let mut record = self.get(id).await?;
        Self::ensure_claimable(&record)?;

        let active = self
            .store
            .list()
            .await?
            .iter()
            .filter(|r| r.id != *id && r.state.holds_claim() && r.claimant() == Some(claimant))
            .count();
        if active >= self.config.max_active_claims {
            return Err(BountyError::ClaimLimitExceeded {
                claimant: claimant.to_string(),
                limit: self.config.max_active_claims,
            });
        }

        let reservation = match &stake {
            Some(stake) => {
                let key = signature_key(stake.signature.as_str());
                let owner = format!("claim:{}:{}:{}", id, claimant, record.prior_claims.len() + 1);
                self.store.reserve(&key, &owner).await.map_err(|e| match e {
                    StoreError::Taken { .. } => {
                        BountyError::SignatureReused(stake.signature.to_string())
                    }
                    other => other.into(),
                })?;
                Some((key, owner))
            }
            None => None,
        };

        let mut steps = Vec::with_capacity(2);
        if record.state == BountyState::Expired {
            steps.push(advance(&mut record, BountyState::Open, "relisted for a new claim")?);
        }
        steps.push(advance(
            &mut record,
            BountyState::Claimed,
            format!("claimed by {}", claimant),
        )?);
        record.claim = Some(ClaimRecord {
            claimant: claimant.clone(),
            payout_wallet,
            stake,
            claimed_at: Utc::now(),
        });

        let actor = Actor::Claimant(claimant.clone());
        match self.commit(record, &actor, steps).await {
            Ok(_) => Ok(BountyState::Claimed),
            Err(e) => {
                if let Some((key, owner)) = reservation {
                    // Keep the stake reserved if the write landed and only the audit append failed
                    let committed = matches!(
                        self.get(id).await,
                        Ok(r) if r.state == BountyState::Claimed && r.claimant() == Some(claimant)
                    );
                    if !committed {
                        self.release_quietly(&key, &owner).await;
                    }
                }
                Err(e)
            }
        }
    }

    fn ensure_claimable(record: &BountyRecord) -> Result<()> {
        match record.state {
            BountyState::Open | BountyState::Expired => Ok(()),
            state if state.holds_claim() => Err(BountyError::AlreadyClaimed {
                bounty_id: record.id.clone(),
                holder: record
                    .claimant()
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
            }),
            BountyState::Paid => Err(BountyError::AlreadyPaid {
                bounty_id: record.id.clone(),
                signature: record
                    .payout_receipt
                    .as_ref()
                    .map(|r| r.signature.to_string())
                    .unwrap_or_default(),
            }),
            state => Err(BountyError::invalid(state, BountyState::Claimed, "bounty is closed")),
        }
    }

    /// CLAIMED -> SUBMITTED, after format validation and rate limiting.
    pub async fn submit(&self, id: &BountyId, submission: Submission) -> Result<BountyState> {
        let _lock = self.locks.acquire(id).await;
        let mut record = self.get(id).await?;

        if record.state != BountyState::Claimed {
            return Err(BountyError::invalid(
                record.state,
                BountyState::Submitted,
                "only a claimed bounty accepts submissions",
            ));
        }
        if record.claimant() != Some(&submission.author) {
            return Err(BountyError::Unauthorized(format!(
                "{} does not hold the claim on bounty {}",
                submission.author, id
            )));
        }

        let fallback = record.claim.as_ref().and_then(|c| c.payout_wallet);
        let validated = self
            .gate
            .admit_submission(
                GateInput {
                    bounty_id: id,
                    submission: &submission,
                    fallback_wallet: fallback.as_ref(),
                    task_labels: &record.task.labels,
                },
                Utc::now(),
            )
            .await?;
        let payout_wallet = validated.payout_wallet.ok_or_else(|| {
            BountyError::FormatInvalid("no payout wallet in submission or claim".to_string())
        })?;

        let step = advance(
            &mut record,
            BountyState::Submitted,
            format!("PR #{} submitted", submission.pr_number),
        )?;
        record.submission = Some(SubmissionRecord {
            pr_number: submission.pr_number,
            diff_fingerprint: submission.diff_fingerprint(),
            payout_wallet,
            submitted_at: Utc::now(),
            content: submission,
        });

        let actor = record
            .claimant()
            .cloned()
            .map(Actor::Claimant)
            .unwrap_or(Actor::System);
        self.commit(record, &actor, vec![step]).await?;
        Ok(BountyState::Submitted)
    }

    /// SUBMITTED -> REVIEWED, with the security scan first. A dirty scan goes
    /// straight to REJECTED whatever the verdict says. On REVIEWED the
    /// verdict may auto-reject, auto-approve (single approval) or wait.
    pub async fn record_review(&self, id: &BountyId, verdict: ReviewVerdict) -> Result<BountyState> {
        let _pause = self.gate.pause().guard(PauseScope::Reviews).await?;
        let _lock = self.locks.acquire(id).await;
        let mut record = self.get(id).await?;
        let now = Utc::now();
        let source = verdict.source.clone();
        let mut steps = Vec::new();

        match record.state {
            BountyState::Submitted => {
                let submission = record.submission.as_ref().ok_or_else(|| {
                    BountyError::invalid(BountyState::Submitted, BountyState::Reviewed, "no submission on record")
                })?;
                let report = self
                    .gate
                    .scan_submission(id, &submission.content, &record.task.labels)
                    .await;
                let clean = report.is_clean();
                record.scan = Some(report.clone());
                record.review_verdict = Some(verdict);

                if !clean {
                    warn!(
                        bounty_id = %id,
                        findings = report.findings.len(),
                        summary = %report.summary(),
                        "🛡️ Security scan vetoed submission"
                    );
                    steps.push(advance(&mut record, BountyState::Rejected, "security scan findings")?);
                    record.rejection = Some(Rejection {
                        code: "security_risk".to_string(),
                        reason: report.summary(),
                        findings: report.findings,
                        actor: Actor::System,
                        at: now,
                    });
                    self.commit(record, &Actor::System, steps).await?;
                    return Ok(BountyState::Rejected);
                }
                steps.push(advance(&mut record, BountyState::Reviewed, "security scan clean")?);
            }
            BountyState::Reviewed => {
                record.review_verdict = Some(verdict);
                steps.push(Step {
                    from: Some(BountyState::Reviewed),
                    to: BountyState::Reviewed,
                    reason: "review verdict replaced".to_string(),
                });
            }
            state => {
                return Err(BountyError::invalid(
                    state,
                    BountyState::Reviewed,
                    "only submitted work can be reviewed",
                ))
            }
        }

        let threshold = self.config.approval_threshold;
        let (score, recommendation, parsed, meets) = match &record.review_verdict {
            Some(v) => (v.score, v.recommendation, v.parsed, v.meets(threshold)),
            None => (0, Recommendation::ManualReview, false, false),
        };

        if parsed
            && self.config.auto_reject_below_threshold
            && (recommendation == Recommendation::Reject || score < threshold)
        {
            let (code, reason) = if recommendation == Recommendation::Reject {
                ("review_rejected", "oracle recommended rejection".to_string())
            } else {
                (
                    "threshold_not_met",
                    format!("score {} below threshold {}", score, threshold),
                )
            };
            steps.push(advance(&mut record, BountyState::Rejected, reason.clone())?);
            record.rejection = Some(Rejection {
                code: code.to_string(),
                reason,
                findings: Vec::new(),
                actor: source.clone(),
                at: now,
            });
        } else if meets && !self.config.require_double_approval {
            steps.push(advance(
                &mut record,
                BountyState::Approved,
                format!("score {} met threshold {}", score, threshold),
            )?);
            record.approvals.push(ApprovalSignal {
                actor: source.clone(),
                at: now,
            });
        } else if !parsed {
            warn!(bounty_id = %id, "Unparseable verdict, waiting for manual review");
        }

        let written = self.commit(record, &source, steps).await?;
        Ok(written.state)
    }

    /// Ask `oracle` for a verdict and record it. Oracle failures fail closed:
    /// the record stays REVIEWED until someone decides.
    pub async fn review_with_oracle(
        &self,
        id: &BountyId,
        oracle: &dyn ReviewOracle,
    ) -> Result<BountyState> {
        let record = self.get(id).await?;
        let submission = match (&record.state, &record.submission) {
            (BountyState::Submitted | BountyState::Reviewed, Some(submission)) => submission,
            (state, _) => {
                return Err(BountyError::invalid(
                    *state,
                    BountyState::Reviewed,
                    "only submitted work can be reviewed",
                ))
            }
        };

        let start = std::time::Instant::now();
        let verdict = match oracle.evaluate(&record.task, &submission.content.diff).await {
            Ok(raw) => parse_verdict(&raw, oracle.reviewer()),
            Err(e) => {
                warn!(bounty_id = %id, error = %e, "Review oracle failed");
                ReviewVerdict::fail_closed(oracle.reviewer(), e.to_string())
            }
        };
        debug!(
            bounty_id = %id,
            score = verdict.score,
            parsed = verdict.parsed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Oracle verdict received"
        );
        self.record_review(id, verdict).await
    }

    /// REVIEWED -> APPROVED on an independent second signal.
    pub async fn approve(&self, id: &BountyId, actor: &Actor) -> Result<BountyState> {
        let _lock = self.locks.acquire(id).await;
        let mut record = self.get(id).await?;

        if record.state != BountyState::Reviewed {
            if let Some(receipt) = &record.payout_receipt {
                return Err(BountyError::AlreadyPaid {
                    bounty_id: id.clone(),
                    signature: receipt.signature.to_string(),
                });
            }
            return Err(BountyError::invalid(
                record.state,
                BountyState::Approved,
                "only reviewed work can be approved",
            ));
        }

        let threshold = self.config.approval_threshold;
        let verdict = record
            .review_verdict
            .as_ref()
            .ok_or(BountyError::ThresholdNotMet { score: 0, threshold })?;
        if !verdict.meets(threshold) {
            return Err(BountyError::ThresholdNotMet {
                score: verdict.score,
                threshold,
            });
        }

        let independent = match actor {
            Actor::Admin(_) => true,
            Actor::Automation(_) => *actor != verdict.source,
            _ => false,
        };
        if !independent {
            return Err(BountyError::Unauthorized(format!(
                "{} cannot give the second approval",
                actor
            )));
        }

        let step = advance(
            &mut record,
            BountyState::Approved,
            format!("approved by {}", actor),
        )?;
        record.approvals.push(ApprovalSignal {
            actor: actor.clone(),
            at: Utc::now(),
        });
        self.commit(record, actor, vec![step]).await?;
        Ok(BountyState::Approved)
    }

    /// Admin rejection of SUBMITTED or REVIEWED work.
    pub async fn reject(&self, id: &BountyId, actor: &Actor, reason: &str) -> Result<BountyState> {
        if !actor.is_admin() {
            return Err(BountyError::Unauthorized(format!("{} may not reject bounties", actor)));
        }
        let _lock = self.locks.acquire(id).await;
        let mut record = self.get(id).await?;

        let step = advance(&mut record, BountyState::Rejected, reason)?;
        record.rejection = Some(Rejection {
            code: "admin_rejected".to_string(),
            reason: reason.to_string(),
            findings: Vec::new(),
            actor: actor.clone(),
            at: Utc::now(),
        });
        self.commit(record, actor, vec![step]).await?;
        Ok(BountyState::Rejected)
    }

    /// APPROVED -> PAID. Idempotent: a paid bounty returns its receipt and
    /// the chain is not touched again.
    pub async fn settle(&self, id: &BountyId) -> Result<SettlementReceipt> {
        if let Some(receipt) = self.get(id).await?.payout_receipt {
            return Ok(receipt);
        }

        let _pause = self.gate.pause().guard(PauseScope::Payouts).await?;
        let _lock = self.locks.acquire(id).await;
        let record = self.get(id).await?;
        if let Some(receipt) = record.payout_receipt {
            return Ok(receipt);
        }
        if record.state != BountyState::Approved {
            return Err(BountyError::invalid(
                record.state,
                BountyState::Paid,
                "only approved bounties are paid",
            ));
        }
        let recipient = record.payout_wallet().ok_or_else(|| {
            BountyError::FormatInvalid("approved bounty has no payout wallet".to_string())
        })?;

        let request = SettlementRequest {
            bounty_id: id.clone(),
            kind: SettlementKind::Payout,
            reference: record.escrow_reference.clone(),
            amount: record.amount,
            recipient,
        };
        let receipt = self.run_settlement(&request, record.pending_settlement).await?;

        let mut record = self.get(id).await?;
        let step = advance(
            &mut record,
            BountyState::Paid,
            format!("settled in {}", receipt.signature.short()),
        )?;
        record.payout_receipt = Some(receipt.clone());
        record.pending_settlement = None;
        let claimant = record.claimant().cloned();
        self.commit(record, &Actor::System, vec![step]).await?;

        if let Some(claimant) = claimant {
            self.gate.record_payout(&claimant, receipt.settled_at).await;
        }
        self.queue.resolve(id).await;
        Ok(receipt)
    }

    /// Release the escrow back to the funder. Admin only; OPEN, CLAIMED or
    /// EXPIRED bounties.
    pub async fn refund(&self, id: &BountyId, actor: &Actor) -> Result<SettlementReceipt> {
        if !actor.is_admin() {
            return Err(BountyError::Unauthorized(format!("{} may not refund bounties", actor)));
        }

        let _pause = self.gate.pause().guard(PauseScope::Payouts).await?;
        let _lock = self.locks.acquire(id).await;
        let record = self.get(id).await?;
        if let Some(receipt) = record.refund_receipt {
            return Ok(receipt);
        }
        if !record.state.can_transition_to(&BountyState::Refunded) {
            return Err(BountyError::invalid(
                record.state,
                BountyState::Refunded,
                "only unstarted or expired bounties are refundable",
            ));
        }
        let request = SettlementRequest {
            bounty_id: id.clone(),
            kind: SettlementKind::Refund,
            reference: record.escrow_reference.clone(),
            amount: record.amount,
            recipient: record.funder,
        };
        let receipt = self.run_settlement(&request, record.pending_settlement).await?;

        let mut record = self.get(id).await?;
        let step = advance(
            &mut record,
            BountyState::Refunded,
            format!("refunded in {}", receipt.signature.short()),
        )?;
        record.refund_receipt = Some(receipt.clone());
        record.pending_settlement = None;
        self.commit(record, actor, vec![step]).await?;

        self.queue.resolve(id).await;
        Ok(receipt)
    }

    /// Ledger call for settle/refund. Caller holds the record lock. A failure
    /// leaves the state unchanged, bumps the attempt count and queues the
    /// bounty for retry or an operator.
    async fn run_settlement(
        &self,
        request: &SettlementRequest,
        in_flight: Option<PendingSettlement>,
    ) -> Result<SettlementReceipt> {
        let journal = RecordJournal {
            store: self.store.as_ref(),
            bounty_id: &request.bounty_id,
        };
        match self.ledger.settle(request, in_flight, &journal).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                let err = BountyError::settlement(e);
                let mut record = self.get(&request.bounty_id).await?;
                record.settlement_attempts += 1;
                let attempts = record.settlement_attempts;
                record.updated_at = Utc::now();
                if let Err(store_err) = self.store.compare_and_swap(&record).await {
                    error!(bounty_id = %request.bounty_id, error = %store_err, "Failed to record settlement attempt");
                }
                self.queue
                    .record_failure(&request.bounty_id, request.kind, attempts, &err)
                    .await;
                Err(err)
            }
        }
    }

    /// Settle every APPROVED bounty that is not parked for an operator.
    /// Returns the ids that were paid.
    pub async fn process_payouts(&self) -> Result<Vec<BountyId>> {
        let mut paid = Vec::new();
        for record in self.store.list().await? {
            if record.state != BountyState::Approved {
                continue;
            }
            if record.settlement_attempts >= self.config.max_settlement_attempts {
                continue;
            }
            if let Some(entry) = self.queue.get(&record.id).await {
                if !entry.retryable {
                    continue;
                }
            }
            match self.settle(&record.id).await {
                Ok(_) => paid.push(record.id),
                Err(BountyError::SystemPaused(_)) => break,
                Err(e) => debug!(bounty_id = %record.id, error = %e, "Payout attempt failed"),
            }
        }
        Ok(paid)
    }

    /// CLAIMED -> EXPIRED for claims older than the deadline with no
    /// submission. Returns the ids that expired.
    pub async fn expire_stale_claims(&self, now: DateTime<Utc>) -> Result<Vec<BountyId>> {
        let deadline = ChronoDuration::seconds(self.config.claim_deadline_secs as i64);
        let mut expired = Vec::new();

        for candidate in self.store.list().await? {
            if !Self::is_stale(&candidate, now, deadline) {
                continue;
            }
            let _lock = self.locks.acquire(&candidate.id).await;
            let mut record = match self.get(&candidate.id).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(bounty_id = %candidate.id, error = %e, "Expiry re-read failed");
                    continue;
                }
            };
            if !Self::is_stale(&record, now, deadline) {
                continue;
            }

            let step = match advance(&mut record, BountyState::Expired, "claim deadline passed") {
                Ok(step) => step,
                Err(e) => {
                    warn!(bounty_id = %record.id, error = %e, "Expiry refused");
                    continue;
                }
            };
            if let Some(claim) = record.claim.take() {
                let stake_disposition = claim.stake.as_ref().map(|_| self.config.stake_policy);
                record.prior_claims.push(ArchivedClaim {
                    claim,
                    expired_at: now,
                    stake_disposition,
                });
            }

            let id = record.id.clone();
            match self.commit(record, &Actor::System, vec![step]).await {
                Ok(_) => {
                    info!(bounty_id = %id, "⌛ Claim expired");
                    expired.push(id);
                }
                Err(e) => warn!(bounty_id = %id, error = %e, "Expiry commit failed"),
            }
        }
        Ok(expired)
    }

    fn is_stale(record: &BountyRecord, now: DateTime<Utc>, deadline: ChronoDuration) -> bool {
        record.state == BountyState::Claimed
            && record
                .claim
                .as_ref()
                .is_some_and(|c| now - c.claimed_at >= deadline)
    }

    /// Toggle an emergency pause scope and audit it.
    pub async fn set_pause(
        &self,
        scope: PauseScope,
        paused: bool,
        actor: &Actor,
    ) -> Result<PauseChange> {
        let change = self.gate.pause().set(scope, paused, actor).await?;
        let verb = if paused { "engaged" } else { "released" };
        self.audit
            .append(AuditEntry::system(
                actor,
                format!("{} pause {} (was {})", scope, verb, change.previous),
            ))
            .await?;
        Ok(change)
    }
}
