//! suns - attest groups of DNS domains that share a symmetry.
//!
//! A group of domains (palindromes, 180° flips, mirrored pairs, ...) is bound
//! to an owner by a canonical group identifier. Every member domain publishes
//! that identifier as a TXT record at `_suns.<domain>`. This crate derives the
//! identifier, collects the published claims over DNS, checks that the group is
//! consistent and actually symmetric, and keeps the attested records fresh.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                               suns                                │
//! │                                                                   │
//! │  ┌──────────────┐   ┌──────────────┐   ┌───────────────────────┐  │
//! │  │ ClaimResolver│──▶│ Attestation  │──▶│ RecordStore           │  │
//! │  │ TXT + 1 CNAME│   │ Engine       │   │ (file / memory)       │  │
//! │  └──────────────┘   └──────┬───────┘   └──────────┬────────────┘  │
//! │         ▲                  │ consistency          │               │
//! │         │ _suns.<domain>   │ + symmetry           ▼               │
//! │         │                  │              ┌───────────────────┐   │
//! │  ┌──────┴───────┐          └─────────────▶│ LifecycleManager  │   │
//! │  │ ClaimServer  │◀── UDP/TCP              │ reattest / drop   │   │
//! │  │ (hickory)    │                         └───────────────────┘   │
//! │  └──────────────┘                                                 │
//! │                                                                   │
//! │  change events ──▶ ViewSync ──▶ SnapshotStore (JSON snapshot)     │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Group identifiers
//!
//! ```text
//! v1:<type code>:<b64 sha256(owner)>:<b64 sha256(sorted hostnames concatenated)>
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use suns::{AttestationEngine, ClaimResolver, FileStore, ResolverSettings, SymmetryType};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> suns::Result<()> {
//!     let resolver = ClaimResolver::from_settings(&ResolverSettings::default())?;
//!     let engine = AttestationEngine::new(resolver)
//!         .with_store(Arc::new(FileStore::new("suns-records.json")));
//!
//!     let result = engine
//!         .attest("alice", SymmetryType::Palindrome, &["aba.example"], &CancellationToken::new())
//!         .await?;
//!     println!("{:?}", result.verdict);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod api;
pub mod attest;
pub mod authority;
pub mod clock;
pub mod config;
pub mod consistency;
pub mod error;
pub mod group_id;
pub mod lifecycle;
pub mod metrics;
pub mod record;
pub mod resolver;
pub mod server;
pub mod snapshot;
pub mod store;
pub mod symmetry;
pub mod telemetry;
pub mod view;
pub mod zone;

// Re-export main types
pub use api::{AttestRequest, AttestResponse};
pub use attest::{AttestResult, AttestationEngine, Verdict};
pub use config::{Config, LogFormat, PublisherConfig, ResolverSettings, SoaConfig, TelemetryConfig};
pub use error::{Result, SunsError};
pub use lifecycle::{LifecycleManager, LifecycleReport, RecordFilter};
pub use record::{DomainRecord, RecordKey, SymmetryType};
pub use resolver::{ClaimLookup, ClaimResolver, HickoryLookup};
pub use server::ClaimServer;
pub use snapshot::{FileSnapshotStore, SnapshotStore};
pub use store::{FileStore, MemoryStore, RecordStore};
pub use view::{ChangeEvent, ViewSync};
pub use zone::ClaimZone;
