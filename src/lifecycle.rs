//! Batch maintenance over the record store.
//!
//! Re-attestation re-runs DNS checks for every stored group; revalidation
//! rechecks stored records without touching DNS. Each group is handled in
//! isolation: one group's failure never aborts the batch. Deletes and
//! refreshes are revision-checked, and a conflict means another writer got
//! there first, so it is skipped and never retried.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::attest::{AttestResult, AttestationEngine, Verdict};
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SunsError};
use crate::metrics;
use crate::record::DomainRecord;
use crate::store::RecordStore;
use crate::symmetry;

/// Default grace period before a failing group is deleted.
pub const DEFAULT_GRACE_PERIOD_HOURS: u64 = 72;

/// Re-attestation outcome for one stored group.
#[derive(Debug)]
pub struct GroupOutcome {
    /// Group identifier.
    pub group_id: String,
    /// Stored records of the group, as listed.
    pub records: Vec<DomainRecord>,
    /// Attestation result, or the error that prevented it.
    pub result: Result<AttestResult>,
}

/// Aggregate counters of a batch mutation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LifecycleReport {
    /// Groups examined.
    pub groups_processed: usize,
    /// Records whose validation time was refreshed.
    pub updated: usize,
    /// Records deleted.
    pub deleted: usize,
    /// Records left untouched (grace period, concurrent change, unverifiable type).
    pub skipped: usize,
    /// Groups or records that failed with an error.
    pub errors: usize,
}

impl LifecycleReport {
    fn emit(&self, operation: &'static str) {
        metrics::record_lifecycle(
            operation,
            self.groups_processed,
            self.updated,
            self.deleted,
            self.skipped,
            self.errors,
        );
        info!(
            operation,
            groups = self.groups_processed,
            updated = self.updated,
            deleted = self.deleted,
            skipped = self.skipped,
            errors = self.errors,
            "lifecycle batch complete"
        );
    }
}

/// Restricts which stored groups are revalidated.
///
/// A group is a candidate if any of its records matches every set field, and
/// then all of its records are checked together.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    /// Match records with this owner.
    pub owner: Option<String>,
    /// Match records with this hostname.
    pub hostname: Option<String>,
    /// Match records in this group.
    pub group_id: Option<String>,
}

impl RecordFilter {
    fn matches(&self, record: &DomainRecord) -> bool {
        self.owner.as_ref().map_or(true, |o| *o == record.owner)
            && self.hostname.as_ref().map_or(true, |h| *h == record.hostname)
            && self.group_id.as_ref().map_or(true, |g| *g == record.group_id)
    }
}

/// A stored group that failed revalidation.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidGroup {
    /// Group identifier.
    pub group_id: String,
    /// Every stored record of the group.
    pub records: Vec<DomainRecord>,
    /// Why the group is invalid.
    pub reason: String,
}

fn group_records(records: Vec<DomainRecord>) -> BTreeMap<String, Vec<DomainRecord>> {
    let mut groups: BTreeMap<String, Vec<DomainRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.group_id.clone()).or_default().push(record);
    }
    groups
}

/// Runs re-attestation and revalidation batches against a record store.
pub struct LifecycleManager {
    engine: AttestationEngine,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    grace_period: Duration,
}

impl LifecycleManager {
    /// Manager over `store`, attesting with `engine` (which should not persist).
    pub fn new(engine: AttestationEngine, store: Arc<dyn RecordStore>) -> Self {
        Self {
            engine,
            store,
            clock: Arc::new(SystemClock),
            grace_period: Duration::hours(DEFAULT_GRACE_PERIOD_HOURS as i64),
        }
    }

    /// Use `clock` for grace-period decisions and refreshed timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Tolerate failing groups for `hours` after their oldest validation.
    pub fn with_grace_period_hours(mut self, hours: u64) -> Self {
        self.grace_period = Duration::hours(hours as i64);
        self
    }

    /// Re-attest every stored group against DNS without changing anything.
    pub async fn reattest_all(&self, cancel: &CancellationToken) -> Result<Vec<GroupOutcome>> {
        let groups = group_records(self.store.list().await?);
        let mut outcomes = Vec::with_capacity(groups.len());

        for (group_id, records) in groups {
            if cancel.is_cancelled() {
                return Err(SunsError::Cancelled);
            }
            let first = &records[0];
            let hostnames: Vec<&str> = records.iter().map(|r| r.hostname.as_str()).collect();
            let result = self
                .engine
                .check(&first.owner, first.symmetry, &hostnames, cancel)
                .await;

            match &result {
                Err(SunsError::Cancelled) => return Err(SunsError::Cancelled),
                Err(e) => warn!(%group_id, error = %e, "re-attestation failed"),
                Ok(r) => debug!(%group_id, verdict = ?r.verdict, "re-attested group"),
            }
            outcomes.push(GroupOutcome {
                group_id,
                records,
                result,
            });
        }
        Ok(outcomes)
    }

    /// Re-attest every group and delete the records of invalid ones.
    pub async fn reattest_all_and_drop(&self, cancel: &CancellationToken) -> Result<LifecycleReport> {
        let outcomes = self.reattest_all(cancel).await?;
        let mut report = LifecycleReport::default();

        for outcome in outcomes {
            if cancel.is_cancelled() {
                return Err(SunsError::Cancelled);
            }
            report.groups_processed += 1;
            match &outcome.result {
                Ok(r) if r.verdict == Verdict::Invalid => {
                    self.delete_group(&outcome.records, &mut report).await;
                }
                Ok(r) if r.verdict == Verdict::Unimplemented => {
                    report.skipped += outcome.records.len();
                }
                Ok(_) => {}
                Err(_) => report.errors += 1,
            }
        }

        report.emit("reattest_drop");
        Ok(report)
    }

    /// Re-attest every group; refresh valid ones and delete invalid ones whose
    /// oldest validation is older than the grace period.
    pub async fn reattest_all_and_update(
        &self,
        cancel: &CancellationToken,
    ) -> Result<LifecycleReport> {
        let outcomes = self.reattest_all(cancel).await?;
        let now = self.clock.now();
        let mut report = LifecycleReport::default();

        for outcome in outcomes {
            if cancel.is_cancelled() {
                return Err(SunsError::Cancelled);
            }
            report.groups_processed += 1;
            let verdict = match &outcome.result {
                Ok(r) => r.verdict,
                Err(_) => {
                    report.errors += 1;
                    continue;
                }
            };

            match verdict {
                Verdict::Valid => self.refresh_group(&outcome.records, now, &mut report).await,
                Verdict::Unimplemented => report.skipped += outcome.records.len(),
                Verdict::Invalid => {
                    if self.grace_expired(&outcome.records, now) {
                        self.delete_group(&outcome.records, &mut report).await;
                    } else {
                        debug!(group_id = %outcome.group_id, "invalid group within grace period");
                        report.skipped += outcome.records.len();
                    }
                }
            }
        }

        report.emit("reattest_update");
        Ok(report)
    }

    /// Revalidate stored groups matching `filter` without any DNS query.
    pub async fn find_invalid(&self, filter: &RecordFilter) -> Result<Vec<InvalidGroup>> {
        Ok(self.scan(filter).await?.1)
    }

    /// Revalidate stored groups matching `filter` and delete every invalid record.
    pub async fn find_invalid_and_drop(
        &self,
        filter: &RecordFilter,
        cancel: &CancellationToken,
    ) -> Result<LifecycleReport> {
        let (candidates, invalid) = self.scan(filter).await?;
        let mut report = LifecycleReport {
            groups_processed: candidates,
            ..Default::default()
        };

        for group in invalid {
            if cancel.is_cancelled() {
                return Err(SunsError::Cancelled);
            }
            info!(group_id = %group.group_id, reason = %group.reason, "dropping invalid group");
            for record in &group.records {
                match self.store.unconditional_delete(&record.key()).await {
                    Ok(()) => report.deleted += 1,
                    Err(e) => {
                        warn!(key = %record.key(), error = %e, "failed to delete record");
                        report.errors += 1;
                    }
                }
            }
        }

        report.emit("find_invalid_drop");
        Ok(report)
    }

    async fn scan(&self, filter: &RecordFilter) -> Result<(usize, Vec<InvalidGroup>)> {
        let groups = group_records(self.store.list().await?);
        let mut candidates = 0;
        let mut invalid = Vec::new();

        for (group_id, records) in groups {
            if !records.iter().any(|r| filter.matches(r)) {
                continue;
            }
            candidates += 1;
            match symmetry::validate(&records) {
                Ok(_) => {}
                Err(SunsError::UnimplementedSymmetry(symmetry)) => {
                    warn!(%group_id, %symmetry, "cannot revalidate group, no validator");
                }
                Err(e) if e.is_invalidity() || matches!(e, SunsError::Input(_)) => {
                    invalid.push(InvalidGroup {
                        group_id,
                        records,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        debug!(candidates, invalid = invalid.len(), "revalidated stored groups");
        Ok((candidates, invalid))
    }

    fn grace_expired(&self, records: &[DomainRecord], now: DateTime<Utc>) -> bool {
        records
            .iter()
            .map(|r| r.validate_time)
            .min()
            .is_some_and(|oldest| now - oldest > self.grace_period)
    }

    async fn delete_group(&self, records: &[DomainRecord], report: &mut LifecycleReport) {
        for record in records {
            let key = record.key();
            match self.store.delete_if_unchanged(&key, record.rev).await {
                Ok(()) => {
                    debug!(%key, "deleted record of invalid group");
                    report.deleted += 1;
                }
                Err(e) if e.is_benign_conflict() => {
                    debug!(%key, error = %e, "record changed concurrently, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(%key, error = %e, "failed to delete record");
                    report.errors += 1;
                }
            }
        }
    }

    async fn refresh_group(
        &self,
        records: &[DomainRecord],
        now: DateTime<Utc>,
        report: &mut LifecycleReport,
    ) {
        for record in records {
            let refreshed = DomainRecord {
                validate_time: now,
                ..record.clone()
            };
            match self.store.update_if_unchanged(refreshed, record.rev).await {
                Ok(_) => report.updated += 1,
                Err(e) if e.is_benign_conflict() => {
                    debug!(key = %record.key(), error = %e, "record changed concurrently, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(key = %record.key(), error = %e, "failed to refresh record");
                    report.errors += 1;
                }
            }
        }
    }
}
