//! Canonical group identifiers.
//!
//! ```text
//! v1:<type code>:<base64 sha256(owner)>:<base64 sha256(sorted hostnames concatenated)>
//! ```
//!
//! Hostnames are sorted byte-wise before hashing, so membership order never
//! changes the identifier. A hostname may appear only once. The result must fit in a single TXT character-string.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SunsError};
use crate::record::SymmetryType;

/// Version tag of the identifier format.
pub const VERSION: &str = "v1";

/// Largest identifier that still fits in one TXT character-string.
pub const MAX_LEN: usize = 255;

fn digest_b64(input: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(input))
}

/// Base64 SHA-256 of an owner string, as embedded in group identifiers.
pub fn hash_owner(owner: &str) -> String {
    digest_b64(owner.as_bytes())
}

/// Compute the canonical group identifier for an owner, type code and hostname set.
pub fn calculate<S: AsRef<str>>(owner: &str, type_code: &str, hostnames: &[S]) -> Result<String> {
    if owner.is_empty() {
        return Err(SunsError::Input("owner must not be empty".into()));
    }
    if type_code.is_empty() {
        return Err(SunsError::Input("type code must not be empty".into()));
    }
    if hostnames.is_empty() {
        return Err(SunsError::Input("at least one hostname is required".into()));
    }

    let mut sorted: Vec<&str> = hostnames.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    if let Some(dup) = sorted.windows(2).find(|w| w[0] == w[1]) {
        return Err(SunsError::Input(format!("duplicate hostname {:?}", dup[0])));
    }
    let domains_hash = digest_b64(sorted.concat().as_bytes());

    let id = ParsedGroupId {
        version: VERSION.to_string(),
        type_code: type_code.to_string(),
        owner_hash: hash_owner(owner),
        domains_hash,
    }
    .to_string();

    if id.len() > MAX_LEN {
        return Err(SunsError::Input(format!(
            "group id is {} bytes, exceeds the {MAX_LEN}-byte TXT limit",
            id.len()
        )));
    }
    Ok(id)
}

/// Group identifier split into its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedGroupId {
    /// Format version, always [`VERSION`] once parsed.
    pub version: String,
    /// Symmetry type code.
    pub type_code: String,
    /// Base64 SHA-256 of the owner.
    pub owner_hash: String,
    /// Base64 SHA-256 of the sorted hostnames.
    pub domains_hash: String,
}

impl ParsedGroupId {
    /// Symmetry type named by the code, if it is a known one.
    pub fn symmetry(&self) -> Option<SymmetryType> {
        SymmetryType::from_code(&self.type_code)
    }
}

impl fmt::Display for ParsedGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.version, self.type_code, self.owner_hash, self.domains_hash
        )
    }
}

impl FromStr for ParsedGroupId {
    type Err = SunsError;

    fn from_str(raw: &str) -> Result<Self> {
        parse(raw)
    }
}

/// Split a raw identifier into its fields.
pub fn parse(raw: &str) -> Result<ParsedGroupId> {
    let fields: Vec<&str> = raw.split(':').collect();
    let &[version, type_code, owner_hash, domains_hash] = fields.as_slice() else {
        return Err(SunsError::format(
            raw,
            format!("expected 4 colon-separated fields, found {}", fields.len()),
        ));
    };
    if version != VERSION {
        return Err(SunsError::format(
            raw,
            format!("unsupported version {version:?}"),
        ));
    }

    Ok(ParsedGroupId {
        version: version.to_string(),
        type_code: type_code.to_string(),
        owner_hash: owner_hash.to_string(),
        domains_hash: domains_hash.to_string(),
    })
}
