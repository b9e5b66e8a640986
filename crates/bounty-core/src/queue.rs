use crate::error::BountyError;
use bounty_ledger::SettlementKind;
use bounty_types::BountyId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;

/// A settlement that did not complete and needs a retry or an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedSettlement {
    pub bounty_id: BountyId,
    pub kind: SettlementKind,
    pub attempts: u32,
    pub reason_code: String,
    pub last_error: String,
    pub retryable: bool,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct OperatorQueue {
    entries: RwLock<HashMap<BountyId, QueuedSettlement>>,
}

impl OperatorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_failure(
        &self,
        bounty_id: &BountyId,
        kind: SettlementKind,
        attempts: u32,
        error: &BountyError,
    ) {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(bounty_id.clone())
            .or_insert_with(|| QueuedSettlement {
                bounty_id: bounty_id.clone(),
                kind,
                attempts: 0,
                reason_code: String::new(),
                last_error: String::new(),
                retryable: true,
                first_failed_at: now,
                last_failed_at: now,
            });
        entry.kind = kind;
        entry.attempts = attempts;
        entry.reason_code = error.reason_code().to_string();
        entry.last_error = error.to_string();
        entry.retryable = error.is_retryable();
        entry.last_failed_at = now;

        warn!(
            bounty_id = %bounty_id,
            attempts,
            reason = %entry.reason_code,
            retryable = entry.retryable,
            "📥 Settlement queued for retry/operator"
        );
    }

    pub async fn resolve(&self, bounty_id: &BountyId) -> Option<QueuedSettlement> {
        self.entries.write().await.remove(bounty_id)
    }

    pub async fn get(&self, bounty_id: &BountyId) -> Option<QueuedSettlement> {
        self.entries.read().await.get(bounty_id).cloned()
    }

    pub async fn pending(&self) -> Vec<QueuedSettlement> {
        let mut entries: Vec<_> = self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.first_failed_at.cmp(&b.first_failed_at));
        entries
    }

    /// Entries the retry worker may pick up on its own.
    pub async fn retryable(&self, max_attempts: u32) -> Vec<QueuedSettlement> {
        self.pending()
            .await
            .into_iter()
            .filter(|e| e.retryable && e.attempts < max_attempts)
            .collect()
    }
}
