//! DNS claim resolution with single-hop CNAME delegation.
//!
//! ```text
//! TXT _suns.<domain>
//!   → values found: return them all
//!   → none: CNAME _suns.<domain>
//!       → alias to a different name: TXT <target>, return whatever is there
//!       → no alias / self alias: empty
//! ```

use async_trait::async_trait;
use hickory_proto::rr::{Name, RData, RecordType};
use hickory_resolver::config::{NameServerConfig, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{ResolveError, Resolver, TokioResolver};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::ResolverSettings;
use crate::error::{Result, SunsError};
use crate::metrics::{self, LookupResult, Timer};

/// Label prefix under which claims are published.
pub const CLAIM_PREFIX: &str = "_suns.";

/// Name queried for a domain's claims.
pub fn claim_label(domain: &str) -> String {
    format!("{CLAIM_PREFIX}{}", normalize(domain))
}

fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Raw record lookups the resolver is built on.
///
/// Absence of records is `Ok` (empty / `None`); only transport failures are errors.
#[async_trait]
pub trait ClaimLookup: Send + Sync {
    /// All TXT values at `name`, each value's character-strings concatenated.
    async fn txt(&self, name: &str) -> Result<Vec<String>>;

    /// CNAME target at `name`, if any.
    async fn cname(&self, name: &str) -> Result<Option<String>>;
}

/// Race a future against cancellation.
pub(crate) async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SunsError::Cancelled),
        result = fut => result,
    }
}

/// Resolves the claims published for a domain.
#[derive(Clone)]
pub struct ClaimResolver {
    lookup: Arc<dyn ClaimLookup>,
}

impl ClaimResolver {
    /// Create a resolver over the given lookup backend.
    pub fn new(lookup: Arc<dyn ClaimLookup>) -> Self {
        Self { lookup }
    }

    /// Create a resolver backed by hickory-resolver.
    pub fn from_settings(settings: &ResolverSettings) -> Result<Self> {
        Ok(Self::new(Arc::new(HickoryLookup::new(settings)?)))
    }

    /// Return every claim published for `domain`, following at most one CNAME hop.
    pub async fn lookup(&self, domain: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        let timer = Timer::start();
        let label = claim_label(domain);

        let claims = match until_cancelled(cancel, self.lookup.txt(&label)).await {
            Ok(claims) => claims,
            Err(e) => {
                metrics::record_lookup(LookupResult::Error, timer.elapsed());
                return Err(e);
            }
        };
        if !claims.is_empty() {
            debug!(%label, count = claims.len(), "claims found");
            metrics::record_lookup(LookupResult::Found, timer.elapsed());
            return Ok(claims);
        }

        let target = match until_cancelled(cancel, self.lookup.cname(&label)).await {
            Ok(target) => target.map(|t| normalize(&t)),
            Err(e) => {
                metrics::record_lookup(LookupResult::Error, timer.elapsed());
                return Err(e);
            }
        };
        let target = match target {
            Some(target) if !target.is_empty() && target != label => target,
            Some(_) => {
                trace!(%label, "alias points back at itself, not following");
                metrics::record_lookup(LookupResult::Empty, timer.elapsed());
                return Ok(Vec::new());
            }
            None => {
                trace!(%label, "no claims and no alias");
                metrics::record_lookup(LookupResult::Empty, timer.elapsed());
                return Ok(Vec::new());
            }
        };

        debug!(%label, %target, "following claim delegation");
        match until_cancelled(cancel, self.lookup.txt(&target)).await {
            Ok(claims) => {
                let result = if claims.is_empty() {
                    LookupResult::Empty
                } else {
                    LookupResult::Delegated
                };
                metrics::record_lookup(result, timer.elapsed());
                Ok(claims)
            }
            Err(e) => {
                metrics::record_lookup(LookupResult::Error, timer.elapsed());
                Err(e)
            }
        }
    }
}

/// [`ClaimLookup`] over hickory's async resolver.
pub struct HickoryLookup {
    resolver: TokioResolver,
}

impl HickoryLookup {
    /// Build a resolver from settings. Without explicit nameservers the system
    /// configuration is used.
    pub fn new(settings: &ResolverSettings) -> Result<Self> {
        let mut builder = if settings.nameservers.is_empty() {
            Resolver::builder_tokio()
                .map_err(|e| SunsError::Config(format!("system resolver config: {e}")))?
        } else {
            let mut config = ResolverConfig::new();
            for addr in &settings.nameservers {
                config.add_name_server(NameServerConfig::new(*addr, Protocol::Udp));
                config.add_name_server(NameServerConfig::new(*addr, Protocol::Tcp));
            }
            Resolver::builder_with_config(config, TokioConnectionProvider::default())
        };

        let opts = builder.options_mut();
        opts.timeout = Duration::from_secs(settings.timeout_secs);
        opts.attempts = settings.attempts;

        Ok(Self {
            resolver: builder.build(),
        })
    }

    fn owner(name: &str) -> Result<Name> {
        Name::from_ascii(format!("{}.", name.trim_end_matches('.')))
            .map_err(|e| SunsError::format(name, format!("not a DNS name: {e}")))
    }

    fn classify(name: &str, e: ResolveError) -> Result<()> {
        if e.is_no_records_found() || e.is_nx_domain() {
            Ok(())
        } else {
            Err(SunsError::Resolution {
                name: name.to_string(),
                reason: e.to_string(),
            })
        }
    }
}

#[async_trait]
impl ClaimLookup for HickoryLookup {
    // hickory chases CNAME chains on its own; only records owned by the
    // queried name count, so the single delegation hop stays with `ClaimResolver`.
    async fn txt(&self, name: &str) -> Result<Vec<String>> {
        let owner = Self::owner(name)?;
        match self.resolver.lookup(owner.clone(), RecordType::TXT).await {
            Ok(lookup) => Ok(lookup
                .records()
                .iter()
                .filter(|record| record.name() == &owner)
                .filter_map(|record| match record.data() {
                    RData::TXT(txt) => Some(
                        txt.txt_data()
                            .iter()
                            .map(|chunk| String::from_utf8_lossy(chunk))
                            .collect::<String>(),
                    ),
                    _ => None,
                })
                .collect()),
            Err(e) => Self::classify(name, e).map(|()| Vec::new()),
        }
    }

    async fn cname(&self, name: &str) -> Result<Option<String>> {
        let owner = Self::owner(name)?;
        match self.resolver.lookup(owner.clone(), RecordType::CNAME).await {
            Ok(lookup) => Ok(lookup
                .records()
                .iter()
                .filter(|record| record.name() == &owner)
                .find_map(|record| match record.data() {
                    RData::CNAME(cname) => Some(cname.0.to_utf8()),
                    _ => None,
                })),
            Err(e) => Self::classify(name, e).map(|()| None),
        }
    }
}

/// In-memory [`ClaimLookup`] for dry runs and tests.
#[derive(Debug, Default)]
pub struct StaticLookup {
    txt: HashMap<String, Vec<String>>,
    cname: HashMap<String, String>,
    failing: HashSet<String>,
    queries: Mutex<Vec<String>>,
}

impl StaticLookup {
    /// Empty lookup table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a TXT value at `name`.
    pub fn with_txt(mut self, name: &str, value: impl Into<String>) -> Self {
        self.txt.entry(normalize(name)).or_default().push(value.into());
        self
    }

    /// Publish a claim for `domain` at its `_suns.` label.
    pub fn with_claim(self, domain: &str, group_id: impl Into<String>) -> Self {
        let label = claim_label(domain);
        self.with_txt(&label, group_id)
    }

    /// Add a CNAME at `name`.
    pub fn with_cname(mut self, name: &str, target: &str) -> Self {
        self.cname.insert(normalize(name), target.to_string());
        self
    }

    /// Make every query for `name` fail with a transport error.
    pub fn with_failure(mut self, name: &str) -> Self {
        self.failing.insert(normalize(name));
        self
    }

    /// Names queried so far, in order, prefixed with the record type.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    fn check(&self, rtype: &str, name: &str) -> Result<String> {
        let name = normalize(name);
        self.queries.lock().push(format!("{rtype} {name}"));
        if self.failing.contains(&name) {
            return Err(SunsError::Resolution {
                name,
                reason: "simulated server failure".into(),
            });
        }
        Ok(name)
    }
}

#[async_trait]
impl ClaimLookup for StaticLookup {
    async fn txt(&self, name: &str) -> Result<Vec<String>> {
        let name = self.check("TXT", name)?;
        Ok(self.txt.get(&name).cloned().unwrap_or_default())
    }

    async fn cname(&self, name: &str) -> Result<Option<String>> {
        let name = self.check("CNAME", name)?;
        Ok(self.cname.get(&name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(lookup: StaticLookup) -> (ClaimResolver, Arc<StaticLookup>) {
        let lookup = Arc::new(lookup);
        (ClaimResolver::new(lookup.clone()), lookup)
    }

    #[test]
    fn test_claim_label_normalizes() {
        assert_eq!(claim_label("Example.COM."), "_suns.example.com");
    }

    #[tokio::test]
    async fn test_returns_all_direct_claims() {
        let (resolver, lookup) = resolver(
            StaticLookup::new()
                .with_claim("aba", "v1:a:x:y")
                .with_claim("aba", "v1:e:x:z"),
        );
        let claims = resolver
            .lookup("aba", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(claims, vec!["v1:a:x:y", "v1:e:x:z"]);
        assert_eq!(lookup.queries(), vec!["TXT _suns.aba"]);
    }

    #[tokio::test]
    async fn test_follows_one_cname_hop() {
        let (resolver, lookup) = resolver(
            StaticLookup::new()
                .with_cname("_suns.aba", "claims.host.example.")
                .with_txt("claims.host.example", "v1:a:x:y"),
        );
        let claims = resolver
            .lookup("aba", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(claims, vec!["v1:a:x:y"]);
        assert_eq!(
            lookup.queries(),
            vec![
                "TXT _suns.aba",
                "CNAME _suns.aba",
                "TXT claims.host.example"
            ]
        );
    }

    #[tokio::test]
    async fn test_does_not_follow_second_hop() {
        let (resolver, lookup) = resolver(
            StaticLookup::new()
                .with_cname("_suns.aba", "hop1.example")
                .with_cname("hop1.example", "hop2.example")
                .with_txt("hop2.example", "v1:a:x:y"),
        );
        let claims = resolver
            .lookup("aba", &CancellationToken::new())
            .await
            .unwrap();
        assert!(claims.is_empty());
        assert_eq!(lookup.queries().len(), 3);
    }

    #[tokio::test]
    async fn test_self_alias_is_not_followed() {
        let (resolver, lookup) =
            resolver(StaticLookup::new().with_cname("_suns.aba", "_suns.aba."));
        let claims = resolver
            .lookup("aba", &CancellationToken::new())
            .await
            .unwrap();
        assert!(claims.is_empty());
        assert_eq!(lookup.queries().len(), 2);
    }

    #[tokio::test]
    async fn test_absence_is_empty_not_error() {
        let (resolver, _) = resolver(StaticLookup::new());
        let claims = resolver
            .lookup("nothing.example", &CancellationToken::new())
            .await
            .unwrap();
        assert!(claims.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let (resolver, _) = resolver(StaticLookup::new().with_failure("_suns.aba"));
        let err = resolver
            .lookup("aba", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SunsError::Resolution { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_lookup() {
        let (resolver, _) = resolver(StaticLookup::new().with_claim("aba", "v1:a:x:y"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = resolver.lookup("aba", &cancel).await.unwrap_err();
        assert!(matches!(err, SunsError::Cancelled));
    }
}
