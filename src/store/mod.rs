//! Record store capability and its backends.
//!
//! Every backend follows the same revision rule: a record's `rev` is 1 after
//! its first insert and increases by exactly one on every successful mutating
//! write. Conditional writes compare against that counter.

use async_trait::async_trait;

use crate::error::Result;
use crate::record::{DomainRecord, RecordKey};

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Keyed storage for [`DomainRecord`]s, keyed by (group id, hostname).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` on key collision.
    async fn store(&self, record: DomainRecord) -> Result<DomainRecord>;

    /// Insert or replace a record.
    async fn unconditional_store(&self, record: DomainRecord) -> Result<DomainRecord>;

    /// Replace a record only if its stored revision is still `rev`.
    async fn update_if_unchanged(&self, record: DomainRecord, rev: u64) -> Result<DomainRecord>;

    /// Fetch a record. Fails with `NotFound`.
    async fn get(&self, key: &RecordKey) -> Result<DomainRecord>;

    /// Every stored record.
    async fn list(&self) -> Result<Vec<DomainRecord>>;

    /// Delete a record. Fails with `NotFound`.
    async fn delete(&self, key: &RecordKey) -> Result<()>;

    /// Delete a record if present.
    async fn unconditional_delete(&self, key: &RecordKey) -> Result<()>;

    /// Delete a record only if its stored revision is still `rev`.
    async fn delete_if_unchanged(&self, key: &RecordKey, rev: u64) -> Result<()>;
}
