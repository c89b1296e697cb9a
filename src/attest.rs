//! Attestation: resolve claims, check them and validate the group's symmetry.
//!
//! ```text
//! expected = calculate(owner, type, domains)
//! for domain in domains (input order):
//!     claims = resolve(_suns.<domain>)
//!     parse every claim, keep the first with matching type code and owner hash
//!     none → invalid, stop
//! consistency(kept claims) → structural(records) → persist (optional)
//! ```
//!
//! Resolution and parse failures are errors: validity could not be determined.
//! Consistency and structural failures are an invalid verdict.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::consistency;
use crate::error::{Result, SunsError};
use crate::group_id::{self, ParsedGroupId};
use crate::metrics::{self, Timer};
use crate::record::{DomainRecord, SymmetryType};
use crate::resolver::ClaimResolver;
use crate::store::RecordStore;
use crate::symmetry;

/// Outcome of an attestation that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Claims and symmetry check out.
    Valid,
    /// Claims are missing, inconsistent, or the symmetry does not hold.
    Invalid,
    /// The symmetry type has no validator, so validity is unknown.
    Unimplemented,
}

impl Verdict {
    /// Lowercase name used in logs and metrics.
    pub fn label(self) -> &'static str {
        match self {
            Verdict::Valid => "valid",
            Verdict::Invalid => "invalid",
            Verdict::Unimplemented => "unimplemented",
        }
    }
}

/// Claims discovered at one domain's label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainClaims {
    /// Domain that was resolved.
    pub domain: String,
    /// Every claim found there, matching or not.
    pub claims: Vec<String>,
}

/// Result of attesting one domain group.
#[derive(Debug, Clone)]
pub struct AttestResult {
    /// Overall verdict.
    pub verdict: Verdict,
    /// Group identifier the domains should publish.
    pub expected_id: String,
    /// Claims discovered, per domain, in input order.
    pub claims: Vec<DomainClaims>,
    /// One record per domain (stored versions when persisted).
    pub records: Vec<DomainRecord>,
    /// Why the group is not valid.
    pub error_message: Option<String>,
}

impl AttestResult {
    /// True only for a [`Verdict::Valid`] outcome.
    pub fn is_valid(&self) -> bool {
        self.verdict == Verdict::Valid
    }

    fn rejected(mut self, verdict: Verdict, message: String) -> Self {
        self.verdict = verdict;
        self.error_message = Some(message);
        self
    }
}

/// Orchestrates claim resolution, consistency and structural validation.
#[derive(Clone)]
pub struct AttestationEngine {
    resolver: ClaimResolver,
    store: Option<Arc<dyn RecordStore>>,
    clock: Arc<dyn Clock>,
}

impl AttestationEngine {
    /// Engine that never persists.
    pub fn new(resolver: ClaimResolver) -> Self {
        Self {
            resolver,
            store: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Persist valid groups to `store`.
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `clock` for validation timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attest a group and, if it is valid and a store is configured, persist its records.
    ///
    /// A storage failure aborts the call; records written before it stay written.
    pub async fn attest<S: AsRef<str>>(
        &self,
        owner: &str,
        symmetry: SymmetryType,
        domains: &[S],
        cancel: &CancellationToken,
    ) -> Result<AttestResult> {
        let mut result = self.check(owner, symmetry, domains, cancel).await?;
        if !result.is_valid() {
            return Ok(result);
        }
        let Some(store) = &self.store else {
            return Ok(result);
        };

        let mut stored = Vec::with_capacity(result.records.len());
        for record in result.records {
            if cancel.is_cancelled() {
                return Err(SunsError::Cancelled);
            }
            let record = store.unconditional_store(record).await?;
            debug!(key = %record.key(), rev = record.rev, "persisted attested record");
            stored.push(record);
        }
        result.records = stored;
        Ok(result)
    }

    /// Attest a group without persisting anything.
    pub async fn check<S: AsRef<str>>(
        &self,
        owner: &str,
        symmetry: SymmetryType,
        domains: &[S],
        cancel: &CancellationToken,
    ) -> Result<AttestResult> {
        let timer = Timer::start();
        let result = self.run(owner, symmetry, domains, cancel).await?;

        metrics::record_attestation(result.verdict.label(), timer.elapsed());
        match result.verdict {
            Verdict::Valid => info!(
                owner,
                %symmetry,
                group_id = %result.expected_id,
                domains = result.records.len(),
                "group attested valid"
            ),
            Verdict::Invalid => info!(
                owner,
                %symmetry,
                group_id = %result.expected_id,
                reason = result.error_message.as_deref().unwrap_or_default(),
                "group attested invalid"
            ),
            Verdict::Unimplemented => warn!(
                owner,
                %symmetry,
                group_id = %result.expected_id,
                "group cannot be attested, symmetry type has no validator"
            ),
        }
        Ok(result)
    }

    async fn run<S: AsRef<str>>(
        &self,
        owner: &str,
        symmetry: SymmetryType,
        domains: &[S],
        cancel: &CancellationToken,
    ) -> Result<AttestResult> {
        let expected_id = group_id::calculate(owner, symmetry.code(), domains)?;
        let owner_hash = group_id::hash_owner(owner);
        let now = self.clock.now();

        let mut result = AttestResult {
            verdict: Verdict::Valid,
            expected_id,
            claims: Vec::with_capacity(domains.len()),
            records: Vec::with_capacity(domains.len()),
            error_message: None,
        };
        let mut kept: Vec<ParsedGroupId> = Vec::with_capacity(domains.len());

        for domain in domains {
            let domain = domain.as_ref();
            let claims = self.resolver.lookup(domain, cancel).await?;

            // Every value must parse, whatever order the records came back in.
            let parsed = claims
                .iter()
                .map(|raw| group_id::parse(raw))
                .collect::<Result<Vec<_>>>()?;
            let matching = parsed
                .into_iter()
                .find(|p| p.type_code == symmetry.code() && p.owner_hash == owner_hash);
            result.claims.push(DomainClaims {
                domain: domain.to_string(),
                claims,
            });

            let Some(claim) = matching else {
                let message = format!("no {symmetry} claim for this owner found at {domain}");
                return Ok(result.rejected(Verdict::Invalid, message));
            };
            result.records.push(DomainRecord::new(
                owner,
                symmetry,
                domain,
                claim.to_string(),
                now,
            ));
            kept.push(claim);
        }

        let checked = consistency::check_consistency(&kept)
            .and_then(|()| symmetry::validate(&result.records).map(|_| ()));
        match checked {
            Ok(()) => Ok(result),
            Err(e) if e.is_invalidity() => Ok(result.rejected(Verdict::Invalid, e.to_string())),
            Err(e @ SunsError::UnimplementedSymmetry(_)) => {
                Ok(result.rejected(Verdict::Unimplemented, e.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}
