use bounty_types::BountyId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per bounty id. Held across a read-modify-write, which for
/// settle and refund includes the ledger call; that call is bounded by the
/// ledger's RPC and confirmation timeouts.
#[derive(Default)]
pub struct RecordLocks {
    locks: Mutex<HashMap<BountyId, Arc<Mutex<()>>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: &BountyId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop entries nobody is holding or waiting on
            locks.retain(|key, lock| key == id || Arc::strong_count(lock) > 1);
            locks
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
