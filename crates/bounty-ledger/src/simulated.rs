//! In-memory chain used by tests and by the node's `simulated` backend.
//!
//! Token balances are tracked per wallet for a single mint. Submitted
//! transactions are verified against their signature and applied
//! atomically: either every leg moves or none does.

use crate::chain::{Blockhash, ChainClient, ChainTransaction, TokenTransfer};
use crate::error::ChainError;
use crate::transaction::SignedTransaction;
use async_trait::async_trait;
use bounty_types::{TokenAmount, TxSignature, WalletAddress};
use chrono::Utc;
use rand::RngCore;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Scripted misbehaviour for the next `submit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Refuse the transaction without applying it
    Reject(String),
    /// Report the node as unreachable without applying the transaction
    Unavailable,
    /// Apply the transaction but report the node as unreachable
    LandThenUnavailable,
    /// Accept the transaction but never include it
    Drop,
}

#[derive(Default)]
struct SimState {
    balances: HashMap<WalletAddress, u64>,
    transactions: HashMap<TxSignature, ChainTransaction>,
    submitted: Vec<TxSignature>,
    faults: VecDeque<Fault>,
    slot: u64,
    hold_confirmations: bool,
}

pub struct SimulatedChain {
    mint: WalletAddress,
    state: RwLock<SimState>,
}

fn random_signature() -> TxSignature {
    let mut bytes = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut bytes);
    TxSignature::from_bytes(&bytes)
}

impl SimulatedChain {
    pub fn new(mint: WalletAddress) -> Self {
        Self {
            mint,
            state: RwLock::new(SimState::default()),
        }
    }

    pub fn mint(&self) -> WalletAddress {
        self.mint
    }

    pub async fn balance(&self, wallet: &WalletAddress) -> TokenAmount {
        let state = self.state.read().await;
        TokenAmount::from_base_units(state.balances.get(wallet).copied().unwrap_or(0))
    }

    /// Record an external confirmed transfer into `destination` carrying `memo`.
    pub async fn deposit(
        &self,
        source: WalletAddress,
        destination: WalletAddress,
        amount: TokenAmount,
        memo: Option<&str>,
    ) -> TxSignature {
        self.insert_external(source, destination, amount, memo, true, None)
            .await
    }

    /// Record a deposit that is seen but not yet confirmed.
    pub async fn deposit_unconfirmed(
        &self,
        source: WalletAddress,
        destination: WalletAddress,
        amount: TokenAmount,
        memo: Option<&str>,
    ) -> TxSignature {
        self.insert_external(source, destination, amount, memo, false, None)
            .await
    }

    /// Record a deposit that landed but failed; no funds move.
    pub async fn deposit_failed(
        &self,
        source: WalletAddress,
        destination: WalletAddress,
        amount: TokenAmount,
        memo: Option<&str>,
    ) -> TxSignature {
        self.insert_external(
            source,
            destination,
            amount,
            memo,
            true,
            Some("InstructionError(0, Custom(1))".to_string()),
        )
        .await
    }

    async fn insert_external(
        &self,
        source: WalletAddress,
        destination: WalletAddress,
        amount: TokenAmount,
        memo: Option<&str>,
        confirmed: bool,
        error: Option<String>,
    ) -> TxSignature {
        let signature = random_signature();
        let mut state = self.state.write().await;
        if error.is_none() {
            *state.balances.entry(destination).or_default() += amount.base_units();
        }
        state.transactions.insert(
            signature.clone(),
            ChainTransaction {
                signature: signature.clone(),
                block_time: confirmed.then(Utc::now),
                error,
                memo: memo.map(str::to_string),
                transfers: vec![TokenTransfer {
                    source,
                    destination,
                    mint: self.mint,
                    amount,
                }],
            },
        );
        signature
    }

    pub async fn inject(&self, fault: Fault) {
        self.state.write().await.faults.push_back(fault);
    }

    /// While held, submitted transactions stay unconfirmed.
    pub async fn hold_confirmations(&self, hold: bool) {
        self.state.write().await.hold_confirmations = hold;
    }

    /// Confirm every transaction still waiting for a block.
    pub async fn confirm_all(&self) {
        let mut state = self.state.write().await;
        let now = Utc::now();
        for tx in state.transactions.values_mut() {
            if tx.block_time.is_none() {
                tx.block_time = Some(now);
            }
        }
    }

    /// Number of transactions applied through `submit`.
    pub async fn submitted_count(&self) -> usize {
        self.state.read().await.submitted.len()
    }

    /// Transactions applied through `submit`, in order.
    pub async fn submitted_transactions(&self) -> Vec<ChainTransaction> {
        let state = self.state.read().await;
        state
            .submitted
            .iter()
            .filter_map(|sig| state.transactions.get(sig).cloned())
            .collect()
    }
}

#[async_trait]
impl ChainClient for SimulatedChain {
    async fn get_transaction(
        &self,
        signature: &TxSignature,
    ) -> Result<Option<ChainTransaction>, ChainError> {
        Ok(self.state.read().await.transactions.get(signature).cloned())
    }

    async fn latest_blockhash(&self) -> Result<Blockhash, ChainError> {
        let mut state = self.state.write().await;
        state.slot += 1;
        Ok(Blockhash::from_bytes(
            *blake3::hash(&state.slot.to_le_bytes()).as_bytes(),
        ))
    }

    async fn submit(&self, signed: &SignedTransaction) -> Result<TxSignature, ChainError> {
        let mut state = self.state.write().await;
        let fault = state.faults.pop_front();

        match &fault {
            Some(Fault::Reject(reason)) => return Err(ChainError::Rejected(reason.clone())),
            Some(Fault::Unavailable) => {
                return Err(ChainError::Unavailable("connection refused".to_string()))
            }
            Some(Fault::Drop) => {
                debug!(signature = %signed.signature.short(), "Simulated chain dropped transaction");
                return Ok(signed.signature.clone());
            }
            _ => {}
        }

        if !signed.verify() {
            return Err(ChainError::Rejected("signature verification failed".to_string()));
        }
        if signed.transaction.mint != self.mint {
            return Err(ChainError::Rejected("unknown mint".to_string()));
        }
        if state.transactions.contains_key(&signed.signature) {
            // Duplicate submission of an identical transaction is a no-op
            return Ok(signed.signature.clone());
        }

        let total = signed
            .transaction
            .total()
            .ok_or_else(|| ChainError::Rejected("amount overflow".to_string()))?;
        let authority = signed.transaction.authority;
        let available = state.balances.get(&authority).copied().unwrap_or(0);
        if available < total.base_units() {
            return Err(ChainError::Rejected(format!(
                "insufficient funds: {} < {}",
                available,
                total.base_units()
            )));
        }

        *state.balances.entry(authority).or_default() -= total.base_units();
        for leg in &signed.transaction.legs {
            *state.balances.entry(leg.recipient).or_default() += leg.amount.base_units();
        }

        let block_time = (!state.hold_confirmations).then(Utc::now);
        state.transactions.insert(
            signed.signature.clone(),
            ChainTransaction {
                signature: signed.signature.clone(),
                block_time,
                error: None,
                memo: Some(signed.transaction.memo.to_string()),
                transfers: signed
                    .transaction
                    .legs
                    .iter()
                    .map(|leg| TokenTransfer {
                        source: authority,
                        destination: leg.recipient,
                        mint: self.mint,
                        amount: leg.amount,
                    })
                    .collect(),
            },
        );
        state.submitted.push(signed.signature.clone());
        info!(
            signature = %signed.signature.short(),
            memo = %signed.transaction.memo,
            legs = signed.transaction.legs.len(),
            "⛓️ Simulated chain applied transaction"
        );

        if fault == Some(Fault::LandThenUnavailable) {
            return Err(ChainError::Unavailable("connection reset".to_string()));
        }
        Ok(signed.signature.clone())
    }
}
