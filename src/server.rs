//! Claim publisher setup and lifecycle management.

use hickory_server::authority::{AuthorityObject, Catalog};
use hickory_server::ServerFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::authority::ClaimAuthority;
use crate::config::PublisherConfig;
use crate::error::Result;
use crate::store::RecordStore;
use crate::zone::ClaimZone;

/// Interval for emitting zone metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Interval for reloading claims from the record store.
const RELOAD_INTERVAL: Duration = Duration::from_secs(30);

/// Periodically emit zone metrics.
async fn metrics_loop(zone: ClaimZone, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                zone.emit_metrics();
                debug!(
                    claims = zone.claims_count(),
                    delegations = zone.delegations_count(),
                    "emitted zone metrics"
                );
            }
            _ = cancel.cancelled() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// Periodically republish the claims held in the record store.
async fn reload_loop(zone: ClaimZone, store: Arc<dyn RecordStore>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(RELOAD_INTERVAL);
    // the first tick completes immediately and the initial load already happened
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = zone.load_from(store.as_ref()).await {
                    warn!(error = %e, "failed to reload claims, serving previous zone");
                }
            }
            _ = cancel.cancelled() => {
                debug!("reload loop shutting down");
                return;
            }
        }
    }
}

/// Authoritative DNS server publishing `_suns.` claims.
pub struct ClaimServer {
    config: PublisherConfig,
    zone: ClaimZone,
    store: Option<Arc<dyn RecordStore>>,
}

impl ClaimServer {
    /// Create a new server with an empty zone.
    pub fn new(config: PublisherConfig) -> Self {
        Self {
            config,
            zone: ClaimZone::new(),
            store: None,
        }
    }

    /// Serve the claims of every record in `store`, reloading periodically.
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Get a reference to the claim zone.
    pub fn zone(&self) -> &ClaimZone {
        &self.zone
    }

    /// Build a catalog holding this server's authority.
    pub fn catalog(&self) -> Result<Catalog> {
        let authority = ClaimAuthority::new(self.config.clone(), self.zone.clone())?;

        let mut catalog = Catalog::new();
        let authority: Arc<dyn AuthorityObject> = Arc::new(authority);
        catalog.upsert(authority.origin().clone(), vec![authority]);
        Ok(catalog)
    }

    /// Run the DNS server until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!(
            listen_addr = %self.config.listen_addr,
            origin = %self.config.origin,
            "Starting suns claim publisher"
        );

        let reload_handle = match &self.store {
            Some(store) => {
                let loaded = self.zone.load_from(store.as_ref()).await?;
                info!(records = loaded, names = self.zone.claims_count(), "Initial claim load complete");
                let zone = self.zone.clone();
                let store = store.clone();
                let cancel = cancel.clone();
                Some(tokio::spawn(reload_loop(zone, store, cancel)))
            }
            None => None,
        };

        let mut server = ServerFuture::new(self.catalog()?);

        // Bind UDP
        let udp_socket = UdpSocket::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        // Bind TCP
        let tcp_listener = TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, Duration::from_secs(30));

        info!(origin = %self.config.origin, "DNS server ready to serve queries");

        let metrics_handle = tokio::spawn(metrics_loop(self.zone.clone(), cancel.clone()));

        // Emit initial metrics
        self.zone.emit_metrics();

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
                cancel.cancel();
            }
        }

        let _ = metrics_handle.await;
        if let Some(handle) = reload_handle {
            let _ = handle.await;
        }

        info!("DNS server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DomainRecord, SymmetryType};
    use crate::store::MemoryStore;
    use chrono::Utc;

    #[test]
    fn test_server_creation() {
        let server = ClaimServer::new(PublisherConfig::new("127.0.0.1:5353".parse().unwrap()));
        assert_eq!(server.zone().claims_count(), 0);
        assert!(server.catalog().is_ok());
    }

    #[test]
    fn test_invalid_origin_fails_catalog() {
        let config = PublisherConfig {
            origin: format!("{}.example", "a".repeat(64)),
            ..PublisherConfig::new("127.0.0.1:5353".parse().unwrap())
        };
        assert!(ClaimServer::new(config).catalog().is_err());
    }

    #[tokio::test]
    async fn test_run_loads_store_and_stops_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        store
            .store(DomainRecord::new("o", SymmetryType::Palindrome, "aba", "g1", Utc::now()))
            .await
            .unwrap();

        let server = ClaimServer::new(PublisherConfig::new("127.0.0.1:0".parse().unwrap()))
            .with_store(store);
        let zone = server.zone().clone();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(server.run(cancel.clone()));
        tokio::time::timeout(Duration::from_secs(5), async {
            while zone.lookup_txt("_suns.aba").is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
