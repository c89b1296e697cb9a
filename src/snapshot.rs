//! Object-store collaborator holding the published materialized view.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, SunsError};
use crate::record::DomainRecord;

/// Storage for the full snapshot, a JSON array of [`DomainRecord`].
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Current snapshot, or `None` if none has been published yet.
    async fn load(&self) -> Result<Option<Vec<DomainRecord>>>;

    /// Replace the snapshot. Readers never observe a partial write.
    async fn save(&self, records: &[DomainRecord]) -> Result<()>;
}

/// Write `bytes` to `path` through a temp file in the same directory and a rename.
pub(crate) async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| SunsError::Storage(format!("snapshot write task failed: {e}")))?
}

/// Snapshot stored as a JSON file.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Snapshot at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> Result<Option<Vec<DomainRecord>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, records: &[DomainRecord]) -> Result<()> {
        let bytes = serde_json::to_vec(records)?;
        write_atomic(&self.path, bytes).await
    }
}

/// Snapshot held in memory as serialized JSON.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    blob: Mutex<Option<Vec<u8>>>,
}

impl MemorySnapshotStore {
    /// No snapshot published yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from raw bytes, which need not be valid JSON.
    pub fn with_raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            blob: Mutex::new(Some(bytes.into())),
        }
    }

    /// Raw bytes of the current snapshot.
    pub fn raw(&self) -> Option<Vec<u8>> {
        self.blob.lock().clone()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<Vec<DomainRecord>>> {
        let blob = self.blob.lock().clone();
        match blob {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, records: &[DomainRecord]) -> Result<()> {
        let bytes = serde_json::to_vec(records)?;
        *self.blob.lock() = Some(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SymmetryType;
    use chrono::Utc;

    #[tokio::test]
    async fn test_file_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("view").join("snapshot.json"));
        assert!(store.load().await.unwrap().is_none());

        let record = DomainRecord::new("o", SymmetryType::Palindrome, "aba", "g", Utc::now());
        store.save(&[record.clone()]).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(vec![record]));
    }

    #[tokio::test]
    async fn test_file_snapshot_is_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        FileSnapshotStore::new(&path).save(&[]).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let store = MemorySnapshotStore::with_raw("{not json");
        assert!(store.load().await.is_err());
    }
}
