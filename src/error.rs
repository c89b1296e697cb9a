//! Error types for suns.

use thiserror::Error;

use crate::record::SymmetryType;

/// Result alias used throughout the crate.
pub type Result<T, E = SunsError> = std::result::Result<T, E>;

/// Errors that can occur while computing, resolving, validating or storing claims.
#[derive(Debug, Error)]
pub enum SunsError {
    /// Caller supplied unusable input (empty owner, no domains, ...).
    #[error("invalid input: {0}")]
    Input(String),

    /// Malformed group identifier or claim value.
    #[error("malformed group id {raw:?}: {reason}")]
    Format {
        /// The offending raw value.
        raw: String,
        /// Why it was rejected.
        reason: String,
    },

    /// DNS transport failure (timeout, server failure).
    #[error("DNS resolution failed for {name}: {reason}")]
    Resolution {
        /// Name being queried.
        name: String,
        /// Transport error description.
        reason: String,
    },

    /// Claims or records disagree about their owner or group.
    #[error("consistency check failed: {0}")]
    Consistency(String),

    /// A symmetry rule was violated.
    #[error("structural validation failed: {0}")]
    Structural(String),

    /// The symmetry type has no structural validator.
    #[error("no structural validator for symmetry type {0}")]
    UnimplementedSymmetry(SymmetryType),

    /// Backend storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Stored revision differs from the expected one.
    #[error("revision conflict for {key}: expected {expected}, found {actual}")]
    RevConflict {
        /// Record key (group id / hostname).
        key: String,
        /// Revision the caller expected.
        expected: u64,
        /// Revision actually stored.
        actual: u64,
    },

    /// Insert-only store hit an existing key.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// Record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The operation was cancelled before completing.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),
}

impl SunsError {
    pub(crate) fn format(raw: &str, reason: impl Into<String>) -> Self {
        Self::Format {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the error means "determined invalid" rather than "could not determine".
    pub fn is_invalidity(&self) -> bool {
        matches!(self, Self::Consistency(_) | Self::Structural(_))
    }

    /// True for conditional-write failures caused by another writer having acted first.
    pub fn is_benign_conflict(&self) -> bool {
        matches!(self, Self::RevConflict { .. } | Self::NotFound(_))
    }
}
