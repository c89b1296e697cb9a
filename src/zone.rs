//! In-memory zone of published claims.
//!
//! Holds the TXT claims served at `_suns.<domain>` labels (and at delegation
//! targets) plus single-hop CNAME delegations. Shared between the record
//! store loader and the DNS authority.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::metrics;
use crate::resolver::claim_label;
use crate::store::RecordStore;

fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Thread-safe in-memory claim zone.
#[derive(Debug, Clone, Default)]
pub struct ClaimZone {
    inner: Arc<RwLock<ZoneInner>>,
}

#[derive(Debug, Default)]
struct ZoneInner {
    /// name -> TXT values
    txt: HashMap<String, Vec<String>>,

    /// name -> CNAME target
    cname: HashMap<String, String>,

    /// Serial number for SOA (incremented on changes)
    serial: u32,
}

impl ZoneInner {
    fn bump(&mut self) {
        self.serial = self.serial.wrapping_add(1);
    }
}

impl ClaimZone {
    /// Create an empty zone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a TXT value at an arbitrary name (e.g. a delegation target).
    pub fn publish_txt(&self, name: &str, value: &str) {
        let mut inner = self.inner.write();
        let values = inner.txt.entry(normalize(name)).or_default();
        if values.iter().any(|v| v == value) {
            return;
        }
        values.push(value.to_string());
        debug!(name, value, "published TXT value");
        inner.bump();
    }

    /// Publish `group_id` as a claim for `domain`.
    pub fn publish_claim(&self, domain: &str, group_id: &str) {
        self.publish_txt(&claim_label(domain), group_id);
    }

    /// Withdraw one claim for `domain`.
    pub fn withdraw_claim(&self, domain: &str, group_id: &str) {
        let label = claim_label(domain);
        let mut inner = self.inner.write();
        let Some(values) = inner.txt.get_mut(&label) else {
            return;
        };
        let before = values.len();
        values.retain(|v| v != group_id);
        if values.len() == before {
            return;
        }
        if values.is_empty() {
            inner.txt.remove(&label);
        }
        debug!(domain, group_id, "withdrew claim");
        inner.bump();
    }

    /// Point `name` at `target` with a CNAME.
    pub fn alias(&self, name: &str, target: &str) {
        let mut inner = self.inner.write();
        inner.cname.insert(normalize(name), normalize(target));
        debug!(name, target, "published CNAME");
        inner.bump();
    }

    /// Delegate `domain`'s claim label to `target` with a CNAME.
    pub fn delegate(&self, domain: &str, target: &str) {
        self.alias(&claim_label(domain), target);
    }

    /// Remove `domain`'s delegation.
    pub fn remove_delegation(&self, domain: &str) {
        let mut inner = self.inner.write();
        if inner.cname.remove(&claim_label(domain)).is_some() {
            inner.bump();
        }
    }

    /// Replace all claims with those of the records in `store`.
    ///
    /// Delegations stay, and so do the TXT values at their targets.
    pub async fn load_from(&self, store: &dyn RecordStore) -> Result<usize> {
        let records = store.list().await?;

        let mut inner = self.inner.write();
        let targets: HashSet<&String> = inner.cname.values().collect();
        let mut txt: HashMap<String, Vec<String>> = inner
            .txt
            .iter()
            .filter(|(name, _)| targets.contains(name))
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect();
        for record in &records {
            let values = txt.entry(claim_label(&record.hostname)).or_default();
            if !values.contains(&record.group_id) {
                values.push(record.group_id.clone());
            }
        }
        inner.txt = txt;
        inner.bump();
        debug!(records = records.len(), names = inner.txt.len(), "loaded claims from store");
        Ok(records.len())
    }

    /// TXT values at `name`.
    pub fn lookup_txt(&self, name: &str) -> Vec<String> {
        self.inner
            .read()
            .txt
            .get(&normalize(name))
            .cloned()
            .unwrap_or_default()
    }

    /// CNAME target at `name`.
    pub fn lookup_cname(&self, name: &str) -> Option<String> {
        self.inner.read().cname.get(&normalize(name)).cloned()
    }

    /// True if the zone holds any record at `name`.
    pub fn has_name(&self, name: &str) -> bool {
        let name = normalize(name);
        let inner = self.inner.read();
        inner.txt.contains_key(&name) || inner.cname.contains_key(&name)
    }

    /// Get current SOA serial.
    pub fn serial(&self) -> u32 {
        self.inner.read().serial
    }

    /// Number of names carrying TXT values.
    pub fn claims_count(&self) -> usize {
        self.inner.read().txt.len()
    }

    /// Number of delegations.
    pub fn delegations_count(&self) -> usize {
        self.inner.read().cname.len()
    }

    /// Emit current zone metrics.
    pub fn emit_metrics(&self) {
        let inner = self.inner.read();
        metrics::record_zone_counts(inner.txt.len(), inner.cname.len(), inner.serial);
    }
}
