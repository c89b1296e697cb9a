//! In-memory record store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

use super::RecordStore;
use crate::error::{Result, SunsError};
use crate::record::{DomainRecord, RecordKey};

/// Keyed record table with the shared revision rules. Backends wrap it.
#[derive(Debug, Default, Clone)]
pub(super) struct Table {
    records: BTreeMap<RecordKey, DomainRecord>,
}

impl Table {
    pub(super) fn from_records(records: Vec<DomainRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.key(), r)).collect(),
        }
    }

    pub(super) fn records(&self) -> Vec<DomainRecord> {
        self.records.values().cloned().collect()
    }

    pub(super) fn insert(&mut self, mut record: DomainRecord) -> Result<DomainRecord> {
        let key = record.key();
        if self.records.contains_key(&key) {
            return Err(SunsError::AlreadyExists(key.to_string()));
        }
        record.rev = 1;
        self.records.insert(key, record.clone());
        Ok(record)
    }

    pub(super) fn upsert(&mut self, mut record: DomainRecord) -> DomainRecord {
        let key = record.key();
        record.rev = self.records.get(&key).map_or(1, |old| old.rev + 1);
        self.records.insert(key, record.clone());
        record
    }

    pub(super) fn update_if(&mut self, mut record: DomainRecord, rev: u64) -> Result<DomainRecord> {
        let key = record.key();
        let current = self.current_rev(&key)?;
        if current != rev {
            return Err(SunsError::RevConflict {
                key: key.to_string(),
                expected: rev,
                actual: current,
            });
        }
        record.rev = current + 1;
        self.records.insert(key, record.clone());
        Ok(record)
    }

    pub(super) fn get(&self, key: &RecordKey) -> Result<DomainRecord> {
        self.records
            .get(key)
            .cloned()
            .ok_or_else(|| SunsError::NotFound(key.to_string()))
    }

    pub(super) fn delete(&mut self, key: &RecordKey) -> Result<()> {
        self.records
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| SunsError::NotFound(key.to_string()))
    }

    pub(super) fn delete_if(&mut self, key: &RecordKey, rev: u64) -> Result<()> {
        let current = self.current_rev(key)?;
        if current != rev {
            return Err(SunsError::RevConflict {
                key: key.to_string(),
                expected: rev,
                actual: current,
            });
        }
        self.records.remove(key);
        Ok(())
    }

    fn current_rev(&self, key: &RecordKey) -> Result<u64> {
        self.records
            .get(key)
            .map(|r| r.rev)
            .ok_or_else(|| SunsError::NotFound(key.to_string()))
    }
}

/// Record store held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<Table>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.table.read().records.len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn store(&self, record: DomainRecord) -> Result<DomainRecord> {
        let stored = self.table.write().insert(record)?;
        debug!(key = %stored.key(), "stored record");
        Ok(stored)
    }

    async fn unconditional_store(&self, record: DomainRecord) -> Result<DomainRecord> {
        let stored = self.table.write().upsert(record);
        debug!(key = %stored.key(), rev = stored.rev, "upserted record");
        Ok(stored)
    }

    async fn update_if_unchanged(&self, record: DomainRecord, rev: u64) -> Result<DomainRecord> {
        self.table.write().update_if(record, rev)
    }

    async fn get(&self, key: &RecordKey) -> Result<DomainRecord> {
        self.table.read().get(key)
    }

    async fn list(&self) -> Result<Vec<DomainRecord>> {
        Ok(self.table.read().records())
    }

    async fn delete(&self, key: &RecordKey) -> Result<()> {
        self.table.write().delete(key)?;
        debug!(%key, "deleted record");
        Ok(())
    }

    async fn unconditional_delete(&self, key: &RecordKey) -> Result<()> {
        let _ = self.table.write().records.remove(key);
        Ok(())
    }

    async fn delete_if_unchanged(&self, key: &RecordKey, rev: u64) -> Result<()> {
        self.table.write().delete_if(key, rev)?;
        debug!(%key, rev, "deleted unchanged record");
        Ok(())
    }
}
