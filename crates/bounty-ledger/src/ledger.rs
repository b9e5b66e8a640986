use crate::chain::{Blockhash, ChainClient, ChainTransaction};
use crate::deposit::{check_deposit, DepositCheck};
use crate::error::{ChainError, LedgerError, Result};
use crate::split::PayoutSplit;
use crate::transaction::{EscrowAuthority, LegRole, PayoutTransaction, SignedTransaction, TransferLeg};
use async_trait::async_trait;
use bounty_types::{
    BountyId, EscrowReference, ReferenceKind, TokenAmount, TxSignature, WalletAddress,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Token mint all escrow amounts are denominated in
    pub mint: WalletAddress,
    pub treasury_wallet: WalletAddress,
    #[serde(default = "default_treasury_bps")]
    pub treasury_bps: u64,
    /// Bound on a single chain read or submit
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    /// How long settle() waits for confirmation before reporting Unconfirmed
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Age after which an unseen submitted transaction is considered dropped
    #[serde(default = "default_blockhash_validity_secs")]
    pub blockhash_validity_secs: u64,
}

fn default_treasury_bps() -> u64 {
    500
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_confirmation_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_blockhash_validity_secs() -> u64 {
    120
}

impl LedgerConfig {
    pub fn new(mint: WalletAddress, treasury_wallet: WalletAddress) -> Self {
        Self {
            mint,
            treasury_wallet,
            treasury_bps: default_treasury_bps(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            blockhash_validity_secs: default_blockhash_validity_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    /// Worker + treasury legs
    Payout,
    /// Whole amount back to the funder
    Refund,
}

/// What to settle. Built by the state machine from an approved (or
/// refundable) record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub bounty_id: BountyId,
    pub kind: SettlementKind,
    /// Settlement reference of the bounty (`b:42`)
    pub reference: EscrowReference,
    pub amount: TokenAmount,
    /// Worker wallet for payouts, funder wallet for refunds
    pub recipient: WalletAddress,
}

impl SettlementRequest {
    /// Memo the settlement transaction carries.
    pub fn memo(&self) -> EscrowReference {
        match self.kind {
            SettlementKind::Payout => self.reference.clone(),
            SettlementKind::Refund => EscrowReference::refund(&self.reference),
        }
    }
}

/// A signed transaction that was handed to the chain and may still land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSettlement {
    pub signature: TxSignature,
    pub kind: SettlementKind,
    pub memo: EscrowReference,
    pub legs: Vec<TransferLeg>,
    pub blockhash: Blockhash,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub signature: TxSignature,
    pub kind: SettlementKind,
    pub memo: EscrowReference,
    pub legs: Vec<TransferLeg>,
    pub settled_at: DateTime<Utc>,
}

impl SettlementReceipt {
    pub fn amount_for(&self, role: LegRole) -> TokenAmount {
        self.legs
            .iter()
            .filter(|l| l.role == role)
            .fold(TokenAmount::ZERO, |acc, l| {
                acc.checked_add(l.amount).unwrap_or(acc)
            })
    }

    pub fn worker_amount(&self) -> TokenAmount {
        self.amount_for(LegRole::Worker)
    }

    pub fn treasury_amount(&self) -> TokenAmount {
        self.amount_for(LegRole::Treasury)
    }
}

/// Durable record of in-flight settlements, written before submission so a
/// crash or timeout after submit is recovered by re-polling the signature.
#[async_trait]
pub trait SettlementJournal: Send + Sync {
    async fn record_pending(&self, pending: &PendingSettlement) -> Result<()>;
    async fn clear_pending(&self, signature: &TxSignature) -> Result<()>;
}

/// Outcome of re-polling a previously submitted signature.
enum Recovery {
    Landed(SettlementReceipt),
    /// Definitely not going to land; safe to rebuild
    Dropped,
}

pub struct EscrowLedger {
    chain: Arc<dyn ChainClient>,
    authority: EscrowAuthority,
    config: LedgerConfig,
    split: PayoutSplit,
    /// Serializes use of the signing key process-wide
    settlement_lock: Mutex<()>,
}

impl EscrowLedger {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        authority: EscrowAuthority,
        config: LedgerConfig,
    ) -> Result<Self> {
        let split = PayoutSplit::new(config.treasury_bps)?;
        info!(
            escrow = %authority.address(),
            treasury = %config.treasury_wallet,
            treasury_bps = config.treasury_bps,
            "🏦 Escrow ledger initialized"
        );
        Ok(Self {
            chain,
            authority,
            config,
            split,
            settlement_lock: Mutex::new(()),
        })
    }

    pub fn escrow_address(&self) -> WalletAddress {
        self.authority.address()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn split(&self) -> PayoutSplit {
        self.split
    }

    fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.config.rpc_timeout_ms)
    }

    async fn fetch(&self, signature: &TxSignature) -> Result<Option<ChainTransaction>> {
        match tokio::time::timeout(self.rpc_timeout(), self.chain.get_transaction(signature)).await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(LedgerError::Timeout(format!(
                "get_transaction {}",
                signature.short()
            ))),
        }
    }

    /// Verify that `signature` deposited at least `expected_amount` into the
    /// escrow wallet with memo exactly `expected_reference`.
    pub async fn verify_deposit(
        &self,
        expected_reference: &EscrowReference,
        expected_amount: TokenAmount,
        signature: &TxSignature,
    ) -> Result<DepositCheck> {
        let start = std::time::Instant::now();
        let tx = self.fetch(signature).await?;
        let check = check_deposit(
            tx.as_ref(),
            expected_reference,
            expected_amount,
            &self.escrow_address(),
            &self.config.mint,
        );

        match &check {
            DepositCheck::Confirmed(proof) => info!(
                reference = %expected_reference,
                signature = %signature.short(),
                received = proof.received.base_units(),
                duration_ms = start.elapsed().as_millis() as u64,
                "🔍 Deposit confirmed"
            ),
            other => warn!(
                reference = %expected_reference,
                signature = %signature.short(),
                outcome = ?other,
                "🔍 Deposit not accepted"
            ),
        }
        Ok(check)
    }

    fn legs_for(&self, request: &SettlementRequest) -> Result<Vec<TransferLeg>> {
        if request.reference.kind() != ReferenceKind::Settlement {
            return Err(LedgerError::InvalidRequest(format!(
                "'{}' is not a settlement reference",
                request.reference
            )));
        }
        if request.amount.is_zero() {
            return Err(LedgerError::InvalidRequest("zero amount".to_string()));
        }

        let legs = match request.kind {
            SettlementKind::Payout => {
                let split = self.split.compute(request.amount)?;
                let mut legs = vec![TransferLeg {
                    recipient: request.recipient,
                    amount: split.worker,
                    role: LegRole::Worker,
                }];
                if !split.treasury.is_zero() {
                    legs.push(TransferLeg {
                        recipient: self.config.treasury_wallet,
                        amount: split.treasury,
                        role: LegRole::Treasury,
                    });
                }
                legs
            }
            SettlementKind::Refund => vec![TransferLeg {
                recipient: request.recipient,
                amount: request.amount,
                role: LegRole::Refund,
            }],
        };
        Ok(legs)
    }

    fn receipt_from(pending: &PendingSettlement, settled_at: DateTime<Utc>) -> SettlementReceipt {
        SettlementReceipt {
            signature: pending.signature.clone(),
            kind: pending.kind,
            memo: pending.memo.clone(),
            legs: pending.legs.clone(),
            settled_at,
        }
    }

    /// Settle `request`, all legs in one transaction.
    ///
    /// `in_flight` is the pending settlement journaled by an earlier attempt,
    /// if any. It is re-polled by signature first and only rebuilt when the
    /// chain has definitely not applied it, so a retry never pays twice.
    pub async fn settle(
        &self,
        request: &SettlementRequest,
        in_flight: Option<PendingSettlement>,
        journal: &dyn SettlementJournal,
    ) -> Result<SettlementReceipt> {
        let start = std::time::Instant::now();
        let legs = self.legs_for(request)?;

        if let Some(pending) = in_flight {
            match self.recover(&pending, journal).await? {
                Recovery::Landed(receipt) => return Ok(receipt),
                Recovery::Dropped => {
                    info!(
                        bounty_id = %request.bounty_id,
                        signature = %pending.signature.short(),
                        "🔄 Previous settlement attempt dropped, rebuilding"
                    );
                }
            }
        }

        let pending = {
            let _guard = self.settlement_lock.lock().await;

            let blockhash = match tokio::time::timeout(
                self.rpc_timeout(),
                self.chain.latest_blockhash(),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => return Err(LedgerError::Timeout("latest_blockhash".to_string())),
            };

            let signed: SignedTransaction = self.authority.sign(PayoutTransaction {
                authority: self.authority.address(),
                mint: self.config.mint,
                recent_blockhash: blockhash.clone(),
                memo: request.memo(),
                legs: legs.clone(),
            });

            let pending = PendingSettlement {
                signature: signed.signature.clone(),
                kind: request.kind,
                memo: request.memo(),
                legs,
                blockhash,
                submitted_at: Utc::now(),
            };
            journal.record_pending(&pending).await?;

            debug!(
                bounty_id = %request.bounty_id,
                signature = %pending.signature.short(),
                kind = ?request.kind,
                "📝 Submitting settlement transaction"
            );

            match tokio::time::timeout(self.rpc_timeout(), self.chain.submit(&signed)).await {
                Ok(Ok(_)) => {}
                Ok(Err(ChainError::Rejected(reason))) => {
                    // Nothing landed; forget the signature so the next attempt rebuilds
                    journal.clear_pending(&pending.signature).await?;
                    error!(
                        bounty_id = %request.bounty_id,
                        reason = %reason,
                        "❌ Settlement transaction rejected"
                    );
                    return Err(LedgerError::TransactionRejected(reason));
                }
                Ok(Err(ChainError::Unavailable(reason))) => {
                    warn!(
                        bounty_id = %request.bounty_id,
                        signature = %pending.signature.short(),
                        reason = %reason,
                        "⚠️ Submission outcome unknown, will re-poll"
                    );
                    return Err(LedgerError::Unconfirmed {
                        signature: pending.signature,
                    });
                }
                Err(_) => {
                    warn!(
                        bounty_id = %request.bounty_id,
                        signature = %pending.signature.short(),
                        "⏳ Submission timed out, will re-poll"
                    );
                    return Err(LedgerError::Unconfirmed {
                        signature: pending.signature,
                    });
                }
            }
            pending
        };

        let receipt = self.await_confirmation(&pending, journal).await?;
        info!(
            bounty_id = %request.bounty_id,
            signature = %receipt.signature.short(),
            kind = ?receipt.kind,
            worker = receipt.worker_amount().base_units(),
            treasury = receipt.treasury_amount().base_units(),
            duration_ms = start.elapsed().as_millis() as u64,
            "💸 Settlement confirmed"
        );
        Ok(receipt)
    }

    async fn recover(
        &self,
        pending: &PendingSettlement,
        journal: &dyn SettlementJournal,
    ) -> Result<Recovery> {
        match self.fetch(&pending.signature).await? {
            Some(tx) if tx.is_failed() => {
                journal.clear_pending(&pending.signature).await?;
                Ok(Recovery::Dropped)
            }
            Some(_) => self
                .await_confirmation(pending, journal)
                .await
                .map(Recovery::Landed),
            None => {
                let age = Utc::now() - pending.submitted_at;
                if age.num_seconds() > self.config.blockhash_validity_secs as i64 {
                    journal.clear_pending(&pending.signature).await?;
                    Ok(Recovery::Dropped)
                } else {
                    Err(LedgerError::Unconfirmed {
                        signature: pending.signature.clone(),
                    })
                }
            }
        }
    }

    async fn await_confirmation(
        &self,
        pending: &PendingSettlement,
        journal: &dyn SettlementJournal,
    ) -> Result<SettlementReceipt> {
        let deadline = tokio::time::Instant::now()
            + Duration::from_millis(self.config.confirmation_timeout_ms);
        let interval = Duration::from_millis(self.config.poll_interval_ms.max(1));

        loop {
            match self.fetch(&pending.signature).await {
                Ok(Some(tx)) if tx.is_failed() => {
                    journal.clear_pending(&pending.signature).await?;
                    return Err(LedgerError::TransactionFailed {
                        signature: pending.signature.clone(),
                        reason: tx.error.unwrap_or_default(),
                    });
                }
                Ok(Some(tx)) => {
                    if let Some(block_time) = tx.block_time {
                        return Ok(Self::receipt_from(pending, block_time));
                    }
                }
                Ok(None) => {}
                Err(e) => debug!(signature = %pending.signature.short(), error = %e, "Confirmation poll failed"),
            }

            if tokio::time::Instant::now() + interval > deadline {
                return Err(LedgerError::Unconfirmed {
                    signature: pending.signature.clone(),
                });
            }
            tokio::time::sleep(interval).await;
        }
    }
}
