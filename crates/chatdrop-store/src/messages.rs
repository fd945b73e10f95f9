//! The message log.
//!
//! [`MessageStore`] owns the path of the log file and is the only code that
//! touches it. Reads never fail: a missing or unreadable log is treated as an
//! empty history. Writes replace the whole file through a temporary sibling
//! so a crash never leaves a truncated log behind.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chatdrop_shared::MessageRecord;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};

#[derive(Debug)]
pub struct MessageStore {
    path: PathBuf,
    max_records: usize,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl MessageStore {
    /// Open the log at `path`, creating its parent directory if needed.
    ///
    /// The file itself is created lazily on the first write.
    pub async fn open(path: impl Into<PathBuf>, max_records: usize) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        info!(path = %path.display(), max_records, "Message store opened");

        Ok(Self {
            path,
            max_records,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// All records in arrival order; empty when the log is missing or corrupt.
    pub async fn load(&self) -> Vec<MessageRecord> {
        match self.read_log().await {
            Ok(records) => records,
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unreadable message log, treating as empty");
                Vec::new()
            }
        }
    }

    /// Append a record, evicting the oldest entries beyond `max_records`.
    pub async fn append(&self, record: MessageRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load().await;
        records.push(record);
        if records.len() > self.max_records {
            let excess = records.len() - self.max_records;
            records.drain(..excess);
        }

        self.write_log(&records).await
    }

    /// Remove the record with `id`. Returns whether one was removed.
    ///
    /// The log is rewritten even when nothing matched.
    pub async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        let removed = records.len() != before;

        self.write_log(&records).await?;
        debug!(id, removed, "Deleted message");
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_log(&[]).await?;
        info!(path = %self.path.display(), "Message log cleared");
        Ok(())
    }

    /// Entries that do not decode as a record are skipped, so one bad entry
    /// never costs the rest of the history.
    async fn read_log(&self) -> Result<Vec<MessageRecord>> {
        let data = fs::read(&self.path).await?;
        let entries: Vec<serde_json::Value> = serde_json::from_slice(&data)?;

        let mut records = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<MessageRecord>(entry) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %self.path.display(),
                    index,
                    error = %e,
                    "Skipping unreadable message record"
                ),
            }
        }
        Ok(records)
    }

    async fn write_log(&self, records: &[MessageRecord]) -> Result<()> {
        let data = serde_json::to_vec_pretty(records)?;
        let tmp = self.tmp_path();

        fs::write(&tmp, &data).await?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(records = records.len(), size = data.len(), "Wrote message log");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}
