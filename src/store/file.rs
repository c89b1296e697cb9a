//! JSON-file-backed record store.
//!
//! The whole table lives in one JSON array. Every operation reads the file,
//! applies the change and atomically replaces the file, serialized by an
//! in-process lock.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::memory::Table;
use super::RecordStore;
use crate::error::Result;
use crate::record::{DomainRecord, RecordKey};
use crate::snapshot::write_atomic;

/// Record store persisted to a single JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Open (or lazily create) a store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Table> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Table::from_records(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Table::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, table: &Table) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&table.records())?;
        write_atomic(&self.path, bytes).await
    }

    async fn mutate<T: Send>(&self, op: impl FnOnce(&mut Table) -> Result<T> + Send) -> Result<T> {
        let _guard = self.lock.lock().await;
        let mut table = self.load().await?;
        let out = op(&mut table)?;
        self.save(&table).await?;
        Ok(out)
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn store(&self, record: DomainRecord) -> Result<DomainRecord> {
        let stored = self.mutate(|t| t.insert(record)).await?;
        debug!(key = %stored.key(), path = %self.path.display(), "stored record");
        Ok(stored)
    }

    async fn unconditional_store(&self, record: DomainRecord) -> Result<DomainRecord> {
        self.mutate(|t| Ok(t.upsert(record))).await
    }

    async fn update_if_unchanged(&self, record: DomainRecord, rev: u64) -> Result<DomainRecord> {
        self.mutate(|t| t.update_if(record, rev)).await
    }

    async fn get(&self, key: &RecordKey) -> Result<DomainRecord> {
        let _guard = self.lock.lock().await;
        self.load().await?.get(key)
    }

    async fn list(&self) -> Result<Vec<DomainRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.records())
    }

    async fn delete(&self, key: &RecordKey) -> Result<()> {
        self.mutate(|t| t.delete(key)).await
    }

    async fn unconditional_delete(&self, key: &RecordKey) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut table = self.load().await?;
        if table.delete(key).is_ok() {
            self.save(&table).await?;
        }
        Ok(())
    }

    async fn delete_if_unchanged(&self, key: &RecordKey, rev: u64) -> Result<()> {
        self.mutate(|t| t.delete_if(key, rev)).await
    }
}
