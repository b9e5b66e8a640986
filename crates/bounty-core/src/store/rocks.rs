use super::{RecordStore, StoreResult};
use crate::error::StoreError;
use crate::record::BountyRecord;
use async_trait::async_trait;
use bounty_types::BountyId;
use rocksdb::{IteratorMode, Options, WriteBatch, WriteOptions, DB};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

const CF_RECORDS: &str = "records";
const CF_RESERVATIONS: &str = "reservations";

/// RocksDB-backed store. Writes are serialized through one mutex so the
/// version check and the write are atomic, and every write is synced.
pub struct RocksDbRecordStore {
    db: Arc<DB>,
    write_lock: Mutex<()>,
}

fn db_err(e: rocksdb::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

impl RocksDbRecordStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open_cf(&opts, path.as_ref(), [CF_RECORDS, CF_RESERVATIONS]).map_err(db_err)?;
        info!(path = %path.as_ref().display(), "🗄️ Opened RocksDB record store");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> StoreResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Unavailable(format!("column family {} not found", name)))
    }

    fn synced() -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(true);
        opts
    }

    fn read(&self, id: &BountyId) -> StoreResult<Option<BountyRecord>> {
        let cf = self.cf(CF_RECORDS)?;
        match self.db.get_cf(cf, id.as_str().as_bytes()).map_err(db_err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, record: &BountyRecord) -> StoreResult<()> {
        let cf = self.cf(CF_RECORDS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(cf, record.id.as_str().as_bytes(), serde_json::to_vec(record)?);
        self.db.write_opt(batch, &Self::synced()).map_err(db_err)
    }
}

#[async_trait]
impl RecordStore for RocksDbRecordStore {
    async fn get(&self, id: &BountyId) -> StoreResult<Option<BountyRecord>> {
        self.read(id)
    }

    async fn insert(&self, record: &BountyRecord) -> StoreResult<BountyRecord> {
        let _guard = self.write_lock.lock().await;
        if self.read(&record.id)?.is_some() {
            return Err(StoreError::AlreadyExists(record.id.clone()));
        }
        let mut stored = record.clone();
        stored.version = 1;
        self.write(&stored)?;
        Ok(stored)
    }

    async fn compare_and_swap(&self, record: &BountyRecord) -> StoreResult<BountyRecord> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .read(&record.id)?
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
        self.write(&stored)?;
        Ok(stored)
    }

    async fn list(&self) -> StoreResult<Vec<BountyRecord>> {
        let cf = self.cf(CF_RECORDS)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item.map_err(db_err)?;
            records.push(serde_json::from_slice::<BountyRecord>(&value)?);
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn reserve(&self, key: &str, owner: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_RESERVATIONS)?;
        match self.db.get_cf(cf, key.as_bytes()).map_err(db_err)? {
            Some(existing) if existing.as_slice() != owner.as_bytes() => Err(StoreError::Taken {
                key: key.to_string(),
                owner: String::from_utf8_lossy(&existing).into_owned(),
            }),
            Some(_) => Ok(()),
            None => {
                let mut batch = WriteBatch::default();
                batch.put_cf(cf, key.as_bytes(), owner.as_bytes());
                self.db.write_opt(batch, &Self::synced()).map_err(db_err)
            }
        }
    }

    async fn release(&self, key: &str, owner: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_RESERVATIONS)?;
        if let Some(existing) = self.db.get_cf(cf, key.as_bytes()).map_err(db_err)? {
            if existing.as_slice() == owner.as_bytes() {
                let mut batch = WriteBatch::default();
                batch.delete_cf(cf, key.as_bytes());
                self.db.write_opt(batch, &Self::synced()).map_err(db_err)?;
            }
        }
        Ok(())
    }
}
