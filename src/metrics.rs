//! Metrics instrumentation for suns.
//!
//! All metrics are prefixed with `suns.`

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Register descriptions with the installed recorder.
pub fn describe() {
    describe_counter!("suns.lookup.count", "Claim lookups by result");
    describe_histogram!("suns.lookup.duration.seconds", Unit::Seconds, "Claim lookup latency");
    describe_counter!("suns.attest.count", "Attestations by verdict");
    describe_histogram!("suns.attest.duration.seconds", Unit::Seconds, "Attestation latency");
    describe_counter!("suns.lifecycle.groups", "Groups visited by lifecycle operations");
    describe_counter!("suns.lifecycle.deleted", "Records deleted by lifecycle operations");
    describe_counter!("suns.view.event.count", "Change events applied to the view");
    describe_gauge!("suns.view.records", "Records in the last published view snapshot");
    describe_counter!("suns.publisher.query.count", "DNS queries answered by the publisher");
    describe_gauge!("suns.publisher.serial", "Current SOA serial of the claim zone");
}

/// Outcome of a claim lookup.
#[derive(Debug, Clone, Copy)]
pub enum LookupResult {
    /// Claims found at the `_suns.` label.
    Found,
    /// Claims found after following the CNAME hop.
    Delegated,
    /// Nothing published.
    Empty,
    /// Transport failure or cancellation.
    Error,
}

/// Record a claim lookup.
pub fn record_lookup(result: LookupResult, duration: std::time::Duration) {
    let result_str = match result {
        LookupResult::Found => "found",
        LookupResult::Delegated => "delegated",
        LookupResult::Empty => "empty",
        LookupResult::Error => "error",
    };

    counter!("suns.lookup.count", "result" => result_str).increment(1);
    histogram!("suns.lookup.duration.seconds").record(duration.as_secs_f64());
}

/// Record a completed attestation by verdict label.
pub fn record_attestation(verdict: &'static str, duration: std::time::Duration) {
    counter!("suns.attest.count", "verdict" => verdict).increment(1);
    histogram!("suns.attest.duration.seconds").record(duration.as_secs_f64());
}

/// Record the counters of a lifecycle batch.
pub fn record_lifecycle(
    operation: &'static str,
    groups: usize,
    updated: usize,
    deleted: usize,
    skipped: usize,
    errors: usize,
) {
    counter!("suns.lifecycle.groups", "op" => operation).increment(groups as u64);
    counter!("suns.lifecycle.updated", "op" => operation).increment(updated as u64);
    counter!("suns.lifecycle.deleted", "op" => operation).increment(deleted as u64);
    counter!("suns.lifecycle.skipped", "op" => operation).increment(skipped as u64);
    counter!("suns.lifecycle.errors", "op" => operation).increment(errors as u64);
}

/// Change event kinds applied to the materialized view.
#[derive(Debug, Clone, Copy)]
pub enum ViewEventType {
    /// New record image.
    Insert,
    /// Replaced record image.
    Modify,
    /// Key removed.
    Remove,
    /// Event could not be decoded or applied.
    Skipped,
}

/// Record an applied (or skipped) view event.
pub fn record_view_event(event_type: ViewEventType) {
    let event_str = match event_type {
        ViewEventType::Insert => "insert",
        ViewEventType::Modify => "modify",
        ViewEventType::Remove => "remove",
        ViewEventType::Skipped => "skipped",
    };

    counter!("suns.view.event.count", "event" => event_str).increment(1);
}

/// Record a published snapshot.
pub fn record_snapshot_published(records: usize) {
    counter!("suns.view.publish.count").increment(1);
    gauge!("suns.view.records").set(records as f64);
}

/// Record a snapshot that could not be loaded and was replaced by an empty one.
pub fn record_snapshot_reset() {
    counter!("suns.view.snapshot_reset.count").increment(1);
}

/// Outcome of a query answered by the claim publisher.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// Query returned records successfully.
    Success,
    /// Name exists but holds no records of the requested type.
    NoData,
    /// Domain not found.
    NxDomain,
}

/// Record a query answered by the claim publisher.
pub fn record_query(record_type: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Success => "success",
        QueryResult::NoData => "nodata",
        QueryResult::NxDomain => "nxdomain",
    };

    counter!("suns.publisher.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("suns.publisher.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Record the size of the published claim zone.
pub fn record_zone_counts(claims: usize, delegations: usize, serial: u32) {
    gauge!("suns.publisher.claims").set(claims as f64);
    gauge!("suns.publisher.delegations").set(delegations as f64);
    gauge!("suns.publisher.serial").set(serial as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
