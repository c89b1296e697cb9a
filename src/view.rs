//! Materialized view kept in sync with the record store's change stream.
//!
//! ```text
//! load snapshot (missing/unreadable → empty)
//!   → index by (group id, hostname)
//!   → INSERT/MODIFY: upsert new image    REMOVE: delete key (absent is fine)
//!   → save full snapshot atomically
//! ```
//!
//! Delivery is at-least-once, so every event is applied as an overwrite or an
//! idempotent delete. Events that cannot be decoded are logged and skipped.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SunsError};
use crate::metrics::{self, ViewEventType};
use crate::record::{DomainRecord, RecordKey};
use crate::snapshot::SnapshotStore;

/// Kind of change carried by a stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventName {
    /// A record was created.
    Insert,
    /// A record was replaced.
    Modify,
    /// A record was deleted.
    Remove,
    /// Anything else the stream may emit.
    #[serde(other)]
    Unknown,
}

/// One change event from the record store's stream.
///
/// Images are kept as raw JSON so a single malformed event cannot fail the
/// decoding of its whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Kind of change.
    pub event_name: EventName,
    /// Primary key of the changed record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<serde_json::Value>,
    /// Full record after the change (INSERT/MODIFY only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<serde_json::Value>,
}

impl ChangeEvent {
    /// INSERT event carrying `record`.
    pub fn insert(record: &DomainRecord) -> Result<Self> {
        Self::with_image(EventName::Insert, record)
    }

    /// MODIFY event carrying `record`.
    pub fn modify(record: &DomainRecord) -> Result<Self> {
        Self::with_image(EventName::Modify, record)
    }

    /// REMOVE event for `key`.
    pub fn remove(key: &RecordKey) -> Result<Self> {
        Ok(Self {
            event_name: EventName::Remove,
            keys: Some(serde_json::to_value(key)?),
            new_image: None,
        })
    }

    fn with_image(event_name: EventName, record: &DomainRecord) -> Result<Self> {
        Ok(Self {
            event_name,
            keys: Some(serde_json::to_value(record.key())?),
            new_image: Some(serde_json::to_value(record)?),
        })
    }
}

/// Counts from one processed batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Events applied to the index.
    pub applied: usize,
    /// Events skipped because they could not be decoded or applied.
    pub skipped: usize,
    /// Records in the published snapshot.
    pub records: usize,
}

/// Applies change-event batches to the snapshot in the object store.
///
/// Single writer: at most one `process_batch` may run against a given snapshot
/// at a time. Within a process `&mut self` enforces this; across processes
/// the deployment must (one consumer per stream, or a leader lease). The
/// load → apply → save sequence takes no lock of its own.
pub struct ViewSync {
    snapshot: Arc<dyn SnapshotStore>,
}

impl ViewSync {
    /// Sync into `snapshot`.
    pub fn new(snapshot: Arc<dyn SnapshotStore>) -> Self {
        Self { snapshot }
    }

    /// Apply one batch and republish the snapshot.
    ///
    /// A cancelled batch publishes nothing.
    pub async fn process_batch(
        &mut self,
        events: &[ChangeEvent],
        cancel: &CancellationToken,
    ) -> Result<BatchSummary> {
        let mut index = self.load_index().await;
        let mut summary = BatchSummary::default();

        for (position, event) in events.iter().enumerate() {
            match apply(&mut index, event) {
                Ok(kind) => {
                    metrics::record_view_event(kind);
                    summary.applied += 1;
                }
                Err(e) => {
                    warn!(position, event = ?event.event_name, error = %e, "skipping change event");
                    metrics::record_view_event(ViewEventType::Skipped);
                    summary.skipped += 1;
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(SunsError::Cancelled);
        }

        let records: Vec<DomainRecord> = index.into_values().collect();
        self.snapshot.save(&records).await?;
        summary.records = records.len();
        metrics::record_snapshot_published(summary.records);
        info!(
            applied = summary.applied,
            skipped = summary.skipped,
            records = summary.records,
            "published snapshot"
        );
        Ok(summary)
    }

    /// Process batches from `batches` until it ends or `cancel` fires.
    pub async fn run<B>(&mut self, mut batches: B, cancel: CancellationToken) -> Result<()>
    where
        B: Stream<Item = Vec<ChangeEvent>> + Unpin,
    {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("view sync received shutdown signal");
                    return Ok(());
                }

                batch = batches.next() => {
                    let Some(batch) = batch else {
                        info!("change stream ended");
                        return Ok(());
                    };
                    if let Err(e) = self.process_batch(&batch, &cancel).await {
                        if matches!(e, SunsError::Cancelled) {
                            return Ok(());
                        }
                        error!(error = %e, events = batch.len(), "failed to publish batch");
                        return Err(e);
                    }
                }
            }
        }
    }

    async fn load_index(&self) -> BTreeMap<RecordKey, DomainRecord> {
        let records = match self.snapshot.load().await {
            Ok(Some(records)) => records,
            Ok(None) => {
                debug!("no snapshot yet, starting empty");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "snapshot unreadable, starting empty");
                metrics::record_snapshot_reset();
                Vec::new()
            }
        };
        records.into_iter().map(|r| (r.key(), r)).collect()
    }
}

fn apply(
    index: &mut BTreeMap<RecordKey, DomainRecord>,
    event: &ChangeEvent,
) -> Result<ViewEventType> {
    match event.event_name {
        EventName::Insert | EventName::Modify => {
            let image = event
                .new_image
                .clone()
                .ok_or_else(|| SunsError::Input("event carries no new image".into()))?;
            let record: DomainRecord = serde_json::from_value(image)?;
            debug!(key = %record.key(), rev = record.rev, "upserting view record");
            index.insert(record.key(), record);
            Ok(if event.event_name == EventName::Insert {
                ViewEventType::Insert
            } else {
                ViewEventType::Modify
            })
        }
        EventName::Remove => {
            let keys = event
                .keys
                .clone()
                .ok_or_else(|| SunsError::Input("event carries no keys".into()))?;
            let key: RecordKey = serde_json::from_value(keys)?;
            if index.remove(&key).is_none() {
                debug!(%key, "remove for absent record");
            }
            Ok(ViewEventType::Remove)
        }
        EventName::Unknown => Err(SunsError::Input("unknown event name".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SymmetryType;
    use crate::snapshot::MemorySnapshotStore;
    use chrono::Utc;

    fn record(hostname: &str, rev: u64) -> DomainRecord {
        DomainRecord {
            rev,
            ..DomainRecord::new("o", SymmetryType::Palindrome, hostname, "g", Utc::now())
        }
    }

    fn sync() -> (ViewSync, Arc<MemorySnapshotStore>) {
        let snapshot = Arc::new(MemorySnapshotStore::new());
        (ViewSync::new(snapshot.clone()), snapshot)
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_idempotent() {
        let (mut sync, snapshot) = sync();
        let event = ChangeEvent::insert(&record("aba", 1)).unwrap();

        let summary = sync
            .process_batch(&[event.clone(), event.clone()], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.records, 1);
        sync.process_batch(&[event], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(snapshot.load().await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_modify_overwrites_and_remove_deletes() {
        let (mut sync, snapshot) = sync();
        let cancel = CancellationToken::new();
        sync.process_batch(
            &[
                ChangeEvent::insert(&record("aba", 1)).unwrap(),
                ChangeEvent::insert(&record("noon", 1)).unwrap(),
                ChangeEvent::modify(&record("aba", 2)).unwrap(),
            ],
            &cancel,
        )
        .await
        .unwrap();

        let records = snapshot.load().await.unwrap().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].rev, 2);

        sync.process_batch(
            &[ChangeEvent::remove(&RecordKey::new("g", "noon")).unwrap()],
            &cancel,
        )
        .await
        .unwrap();
        let records = snapshot.load().await.unwrap().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hostname, "aba");
    }

    #[tokio::test]
    async fn test_remove_of_absent_key_is_noop() {
        let (mut sync, _) = sync();
        let summary = sync
            .process_batch(
                &[ChangeEvent::remove(&RecordKey::new("g", "missing")).unwrap()],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.records, 0);
    }

    #[tokio::test]
    async fn test_bad_events_are_skipped() {
        let (mut sync, snapshot) = sync();
        let events = vec![
            ChangeEvent {
                event_name: EventName::Insert,
                keys: None,
                new_image: Some(serde_json::json!({"Owner": 5})),
            },
            ChangeEvent {
                event_name: EventName::Remove,
                keys: None,
                new_image: None,
            },
            ChangeEvent {
                event_name: EventName::Unknown,
                keys: None,
                new_image: None,
            },
            ChangeEvent::insert(&record("aba", 1)).unwrap(),
        ];
        let summary = sync
            .process_batch(&events, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.applied, 1);
        assert_eq!(snapshot.load().await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_starts_empty() {
        let snapshot = Arc::new(MemorySnapshotStore::with_raw("garbage"));
        let mut sync = ViewSync::new(snapshot.clone());
        let summary = sync
            .process_batch(
                &[ChangeEvent::insert(&record("aba", 1)).unwrap()],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(summary.records, 1);
        assert_eq!(snapshot.load().await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_batch_publishes_nothing() {
        let (mut sync, snapshot) = sync();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = sync
            .process_batch(&[ChangeEvent::insert(&record("aba", 1)).unwrap()], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SunsError::Cancelled));
        assert!(snapshot.raw().is_none());
    }

    #[test]
    fn test_event_wire_format() {
        let event: ChangeEvent = serde_json::from_str(
            r#"{"eventName":"REMOVE","keys":{"GroupID":"g","Hostname":"aba"}}"#,
        )
        .unwrap();
        assert_eq!(event.event_name, EventName::Remove);

        let odd: ChangeEvent = serde_json::from_str(r#"{"eventName":"TTL_EXPIRE"}"#).unwrap();
        assert_eq!(odd.event_name, EventName::Unknown);
    }

    #[tokio::test]
    async fn test_run_drains_stream() {
        let (mut sync, snapshot) = sync();
        let batches = futures::stream::iter(vec![
            vec![ChangeEvent::insert(&record("aba", 1)).unwrap()],
            vec![ChangeEvent::insert(&record("noon", 1)).unwrap()],
        ]);
        sync.run(batches, CancellationToken::new()).await.unwrap();
        assert_eq!(snapshot.load().await.unwrap().unwrap().len(), 2);
    }
}
