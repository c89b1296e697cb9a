//! Configuration types for suns.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// How claims are resolved.
    #[serde(default)]
    pub resolver: ResolverSettings,

    /// Re-attestation policy.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Record store location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Materialized view snapshot location.
    #[serde(default)]
    pub view: ViewConfig,

    /// Claim publisher. Only needed by `serve`.
    #[serde(default)]
    pub publisher: Option<PublisherConfig>,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Claim resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Nameservers to query. Empty means the system resolver configuration.
    #[serde(default)]
    pub nameservers: Vec<SocketAddr>,

    /// Per-query timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per query.
    #[serde(default = "default_attempts")]
    pub attempts: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            nameservers: Vec::new(),
            timeout_secs: default_timeout_secs(),
            attempts: default_attempts(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    2
}

fn default_attempts() -> usize {
    1
}

/// Re-attestation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// How long an invalid group survives after its last good attestation.
    #[serde(default = "default_grace_period_hours")]
    pub grace_period_hours: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            grace_period_hours: default_grace_period_hours(),
        }
    }
}

fn default_grace_period_hours() -> u64 {
    crate::lifecycle::DEFAULT_GRACE_PERIOD_HOURS
}

/// Record store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding the attested records.
    #[serde(default = "default_records_path")]
    pub records_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            records_path: default_records_path(),
        }
    }
}

fn default_records_path() -> PathBuf {
    PathBuf::from("suns-records.json")
}

/// Materialized view snapshot location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    /// JSON file the view snapshot is published to.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("suns-view.json")
}

/// Claim publisher (authoritative DNS) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Address for DNS server to listen on (UDP and TCP).
    pub listen_addr: SocketAddr,

    /// Zone origin. The root zone serves `_suns.<domain>` for any domain.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// TTL for DNS records in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// SOA record configuration.
    #[serde(default)]
    pub soa: SoaConfig,
}

impl PublisherConfig {
    /// Publisher on `listen_addr` with every other setting defaulted.
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            origin: default_origin(),
            ttl: default_ttl(),
            soa: SoaConfig::default(),
        }
    }
}

fn default_origin() -> String {
    ".".to_string()
}

fn default_ttl() -> u32 {
    60
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "suns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Layout of log lines on stderr.
    #[serde(default)]
    pub log_format: LogFormat,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,

    /// OpenTelemetry configuration.
    #[serde(default)]
    pub opentelemetry: Option<OpenTelemetryConfig>,
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Timestamp, level, target, span context and fields.
    #[default]
    Full,
    /// Single-line output with span names folded into the message.
    Compact,
}

/// OpenTelemetry exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTelemetryConfig {
    /// OTLP endpoint (e.g., "http://localhost:4317").
    pub endpoint: String,

    /// Service name for traces.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            prometheus_addr: None,
            opentelemetry: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "suns".to_string()
}

/// SOA (Start of Authority) record configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoaConfig {
    /// Primary nameserver hostname (e.g., "ns1.example.com").
    pub mname: String,

    /// Admin email in DNS format (e.g., "admin.example.com" for admin@example.com).
    pub rname: String,

    /// Refresh interval in seconds.
    #[serde(default = "default_refresh")]
    pub refresh: u32,

    /// Retry interval in seconds.
    #[serde(default = "default_retry")]
    pub retry: u32,

    /// Expire time in seconds.
    #[serde(default = "default_expire")]
    pub expire: u32,

    /// Minimum TTL in seconds.
    #[serde(default = "default_minimum")]
    pub minimum: u32,
}

fn default_refresh() -> u32 {
    3600
}

fn default_retry() -> u32 {
    600
}

fn default_expire() -> u32 {
    604800
}

fn default_minimum() -> u32 {
    60
}

impl Default for SoaConfig {
    fn default() -> Self {
        Self {
            mname: "ns1.example.com".to_string(),
            rname: "admin.example.com".to_string(),
            refresh: default_refresh(),
            retry: default_retry(),
            expire: default_expire(),
            minimum: default_minimum(),
        }
    }
}
