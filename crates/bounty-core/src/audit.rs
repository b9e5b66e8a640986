use crate::error::StoreError;
use crate::state::BountyState;
use async_trait::async_trait;
use bounty_types::{Actor, BountyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// One append-only audit line. Pause toggles carry no bounty id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Assigned by the log on append
    pub seq: u64,
    pub bounty_id: Option<BountyId>,
    pub from_state: Option<BountyState>,
    pub to_state: Option<BountyState>,
    pub actor: Actor,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn transition(
        bounty_id: &BountyId,
        from: Option<BountyState>,
        to: BountyState,
        actor: &Actor,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            seq: 0,
            bounty_id: Some(bounty_id.clone()),
            from_state: from,
            to_state: Some(to),
            actor: actor.clone(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(actor: &Actor, reason: impl Into<String>) -> Self {
        Self {
            seq: 0,
            bounty_id: None,
            from_state: None,
            to_state: None,
            actor: actor.clone(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append and return the assigned sequence number. Once this returns the
    /// entry survives a restart.
    async fn append(&self, entry: AuditEntry) -> Result<u64, StoreError>;

    async fn entries_for(&self, bounty_id: &BountyId) -> Result<Vec<AuditEntry>, StoreError>;

    async fn all(&self) -> Result<Vec<AuditEntry>, StoreError>;
}

#[derive(Default)]
pub struct MemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, mut entry: AuditEntry) -> Result<u64, StoreError> {
        let mut entries = self.entries.write().await;
        entry.seq = entries.len() as u64 + 1;
        let seq = entry.seq;
        entries.push(entry);
        Ok(seq)
    }

    async fn entries_for(&self, bounty_id: &BountyId) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.bounty_id.as_ref() == Some(bounty_id))
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.entries.read().await.clone())
    }
}

#[derive(Default)]
struct LogContents {
    entries: Vec<AuditEntry>,
    /// Bytes up to the end of the last parseable line
    valid_len: u64,
    total_len: u64,
    /// Whether the kept bytes end in a newline
    terminated: bool,
}

impl LogContents {
    fn needs_repair(&self) -> bool {
        self.valid_len < self.total_len || (self.total_len > 0 && !self.terminated)
    }
}

struct FileState {
    file: tokio::fs::File,
    next_seq: u64,
}

/// JSON-lines audit log. Each append is written and `sync_data`ed before
/// it is acknowledged.
pub struct FileAuditLog {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileAuditLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let existing = Self::read_log(&path).await?;
        if existing.needs_repair() {
            Self::repair_tail(&path, &existing).await?;
        }
        let entries = existing.entries;
        let next_seq = entries.last().map(|e| e.seq + 1).unwrap_or(1);

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!(
            path = %path.display(),
            entries = entries.len(),
            "📜 Audit log opened"
        );
        Ok(Self {
            path,
            state: Mutex::new(FileState { file, next_seq }),
        })
    }

    /// Parse every line. Only an unterminated final line may fail to parse:
    /// that is an append cut short by a crash, and it is left out. A bad
    /// line anywhere before it is corruption.
    async fn read_log(path: &Path) -> Result<LogContents, StoreError> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LogContents::default())
            }
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        let mut offset = 0usize;
        while offset < content.len() {
            let (line, terminated) = match content[offset..].iter().position(|b| *b == b'\n') {
                Some(n) => (&content[offset..offset + n], true),
                None => (&content[offset..], false),
            };
            let next = offset + line.len() + usize::from(terminated);

            if !line.iter().all(u8::is_ascii_whitespace) {
                match serde_json::from_slice::<AuditEntry>(line) {
                    Ok(entry) => entries.push(entry),
                    Err(e) if !terminated => {
                        warn!(
                            path = %path.display(),
                            offset,
                            error = %e,
                            "Dropping torn audit entry at end of log"
                        );
                        return Ok(LogContents {
                            entries,
                            valid_len: offset as u64,
                            total_len: content.len() as u64,
                            terminated: true,
                        });
                    }
                    Err(e) => {
                        return Err(StoreError::Serialization(format!(
                            "audit log {} corrupt at byte {}: {}",
                            path.display(),
                            offset,
                            e
                        )))
                    }
                }
            }
            offset = next;
        }

        Ok(LogContents {
            entries,
            valid_len: content.len() as u64,
            total_len: content.len() as u64,
            terminated: content.last().map_or(true, |b| *b == b'\n'),
        })
    }

    /// Cut a torn tail off, or finish a complete last line that lost its
    /// newline, so the next append starts on a fresh line.
    async fn repair_tail(path: &Path, contents: &LogContents) -> Result<(), StoreError> {
        let mut file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
        if contents.valid_len < contents.total_len {
            file.set_len(contents.valid_len).await?;
        }
        if !contents.terminated {
            file.seek(std::io::SeekFrom::End(0)).await?;
            file.write_all(b"\n").await?;
        }
        file.sync_data().await?;
        warn!(
            path = %path.display(),
            kept_bytes = contents.valid_len,
            dropped_bytes = contents.total_len - contents.valid_len,
            "Audit log tail repaired"
        );
        Ok(())
    }

    async fn read_entries(path: &Path) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(Self::read_log(path).await?.entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditLog for FileAuditLog {
    async fn append(&self, mut entry: AuditEntry) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        entry.seq = state.next_seq;

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        state.file.write_all(&line).await?;
        state.file.flush().await?;
        state.file.sync_data().await?;

        state.next_seq += 1;
        debug!(seq = entry.seq, reason = %entry.reason, "Audit entry appended");
        Ok(entry.seq)
    }

    async fn entries_for(&self, bounty_id: &BountyId) -> Result<Vec<AuditEntry>, StoreError> {
        let _state = self.state.lock().await;
        Ok(Self::read_entries(&self.path)
            .await?
            .into_iter()
            .filter(|e| e.bounty_id.as_ref() == Some(bounty_id))
            .collect())
    }

    async fn all(&self) -> Result<Vec<AuditEntry>, StoreError> {
        let _state = self.state.lock().await;
        Self::read_entries(&self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(id: u64, to: BountyState) -> AuditEntry {
        AuditEntry::transition(&BountyId::from(id), None, to, &Actor::System, "test")
    }

    #[tokio::test]
    async fn test_memory_log_sequence() {
        let log = MemoryAuditLog::new();
        assert_eq!(log.append(entry(1, BountyState::Open)).await.unwrap(), 1);
        assert_eq!(log.append(entry(2, BountyState::Open)).await.unwrap(), 2);
        assert_eq!(log.entries_for(&BountyId::from(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("audit.jsonl");

        {
            let log = FileAuditLog::open(&path).await.unwrap();
            log.append(entry(1, BountyState::Open)).await.unwrap();
            log.append(entry(1, BountyState::Claimed)).await.unwrap();
        }

        let log = FileAuditLog::open(&path).await.unwrap();
        let seq = log.append(entry(2, BountyState::Open)).await.unwrap();
        assert_eq!(seq, 3);

        let trail = log.entries_for(&BountyId::from(1)).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[1].to_state, Some(BountyState::Claimed));
    }

    fn append_raw(path: &Path, bytes: &[u8]) {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(bytes).unwrap();
    }

    #[tokio::test]
    async fn test_torn_last_line_is_dropped_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        {
            let log = FileAuditLog::open(&path).await.unwrap();
            log.append(entry(42, BountyState::Open)).await.unwrap();
            log.append(entry(42, BountyState::Claimed)).await.unwrap();
        }
        append_raw(&path, br#"{"seq":3,"bounty_id":"42","fro"#);

        let log = FileAuditLog::open(&path).await.unwrap();
        assert_eq!(log.all().await.unwrap().len(), 2);
        assert_eq!(log.append(entry(42, BountyState::Submitted)).await.unwrap(), 3);
        drop(log);

        let log = FileAuditLog::open(&path).await.unwrap();
        let trail = log.entries_for(&BountyId::from(42)).await.unwrap();
        assert_eq!(trail.len(), 3);
        assert_eq!(trail[2].seq, 3);
        assert_eq!(trail[2].to_state, Some(BountyState::Submitted));
    }

    #[tokio::test]
    async fn test_complete_last_line_without_newline_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        {
            let log = FileAuditLog::open(&path).await.unwrap();
            log.append(entry(1, BountyState::Open)).await.unwrap();
        }
        let mut second = entry(1, BountyState::Claimed);
        second.seq = 2;
        append_raw(&path, &serde_json::to_vec(&second).unwrap());

        let log = FileAuditLog::open(&path).await.unwrap();
        assert_eq!(log.append(entry(1, BountyState::Submitted)).await.unwrap(), 3);
        let all = log.all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].to_state, Some(BountyState::Claimed));
    }

    #[tokio::test]
    async fn test_corruption_before_the_tail_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        {
            let log = FileAuditLog::open(&path).await.unwrap();
            log.append(entry(1, BountyState::Open)).await.unwrap();
        }
        append_raw(&path, b"{\"seq\":2,\"bounty\n");
        let mut later = entry(1, BountyState::Claimed);
        later.seq = 3;
        let mut line = serde_json::to_vec(&later).unwrap();
        line.push(b'\n');
        append_raw(&path, &line);
        {
            let log = FileAuditLog::open(&path).await;
            assert!(matches!(log, Err(StoreError::Serialization(_))));
        }

        // The damaged file is left as it was.
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"bounty\n"));
        assert!(content.ends_with("}\n"));
    }

    #[tokio::test]
    async fn test_concurrent_appends_get_distinct_seqs() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(FileAuditLog::open(dir.path().join("a.jsonl")).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.append(entry(i, BountyState::Open)).await.unwrap()
            }));
        }
        let mut seqs = Vec::new();
        for h in handles {
            seqs.push(h.await.unwrap());
        }
        seqs.sort();
        assert_eq!(seqs, (1..=16).collect::<Vec<u64>>());
        assert_eq!(log.all().await.unwrap().len(), 16);
    }
}
