use super::{RecordStore, StoreResult};
use crate::error::StoreError;
use crate::record::BountyRecord;
use async_trait::async_trait;
use bounty_types::BountyId;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<BountyId, BountyRecord>>,
    reservations: RwLock<HashMap<String, String>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        info!("🗄️ Using in-memory record store");
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, id: &BountyId) -> StoreResult<Option<BountyRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn insert(&self, record: &BountyRecord) -> StoreResult<BountyRecord> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id.clone()));
        }
        let mut stored = record.clone();
        stored.version = 1;
        records.insert(stored.id.clone(), stored.clone());
        debug!(bounty_id = %stored.id, "Record inserted");
        Ok(stored)
    }

    async fn compare_and_swap(&self, record: &BountyRecord) -> StoreResult<BountyRecord> {
        let mut records = self.records.write().await;
        let current = records
            .get(&record.id)
            .ok_or_else(|| StoreError::NotFound(record.id.clone()))?;
        if current.version != record.version {
            return Err(StoreError::Conflict {
                id: record.id.clone(),
                expected: record.version,
                found: current.version,
            });
        }
        let mut stored = record.clone();
        stored.version += 1;
        records.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn list(&self) -> StoreResult<Vec<BountyRecord>> {
        let mut records: Vec<BountyRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn reserve(&self, key: &str, owner: &str) -> StoreResult<()> {
        let mut reservations = self.reservations.write().await;
        match reservations.get(key) {
            Some(existing) if existing != owner => Err(StoreError::Taken {
                key: key.to_string(),
                owner: existing.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                reservations.insert(key.to_string(), owner.to_string());
                Ok(())
            }
        }
    }

    async fn release(&self, key: &str, owner: &str) -> StoreResult<()> {
        let mut reservations = self.reservations.write().await;
        if reservations.get(key).map(String::as_str) == Some(owner) {
            reservations.remove(key);
        }
        Ok(())
    }
}
