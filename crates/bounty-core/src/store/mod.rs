//! Durable record storage.
//!
//! Writes are compare-and-swap on the record's `version`, so two handlers
//! racing on the same bounty can never silently overwrite each other.
//! Reservations give deposit signatures and escrow references a single
//! owner across all records.

mod memory;
#[cfg(feature = "rocksdb")]
mod rocks;

pub use memory::MemoryRecordStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbRecordStore;

use crate::error::StoreError;
use crate::record::BountyRecord;
use async_trait::async_trait;
use bounty_types::BountyId;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: &BountyId) -> StoreResult<Option<BountyRecord>>;

    /// Store a new record at version 1. Fails with `AlreadyExists` if the id is taken.
    async fn insert(&self, record: &BountyRecord) -> StoreResult<BountyRecord>;

    /// Replace the record if its stored version is still `record.version`;
    /// returns the record as written, with the version bumped.
    async fn compare_and_swap(&self, record: &BountyRecord) -> StoreResult<BountyRecord>;

    async fn list(&self) -> StoreResult<Vec<BountyRecord>>;

    /// Claim `key` for `owner`. Re-reserving with the same owner succeeds;
    /// any other owner gets `Taken`.
    async fn reserve(&self, key: &str, owner: &str) -> StoreResult<()>;

    /// Drop a reservation held by `owner`; a no-op otherwise.
    async fn release(&self, key: &str, owner: &str) -> StoreResult<()>;
}

pub(crate) fn signature_key(signature: &str) -> String {
    format!("sig:{}", signature)
}

pub(crate) fn reference_key(reference: &str) -> String {
    format!("ref:{}", reference)
}
