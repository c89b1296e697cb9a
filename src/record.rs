//! Persisted domain records and the closed set of symmetry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::SunsError;

/// Kind of textual symmetry a group of domains claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymmetryType {
    /// A single hostname that reads the same backwards.
    Palindrome,
    /// A single hostname that reads the same after a 180° rotation.
    Flip180,
    /// Two hostnames that are 180° rotations of each other.
    DoubleFlip180,
    /// A single hostname that is its own left-right mirror image.
    MirrorText,
    /// Two hostnames whose dot-separated labels are reversed copies.
    MirrorNames,
    /// Hostnames whose labels pair up as antonyms.
    AntonymNames,
}

impl SymmetryType {
    /// Every variant, in code order.
    pub const ALL: [SymmetryType; 6] = [
        SymmetryType::Palindrome,
        SymmetryType::Flip180,
        SymmetryType::DoubleFlip180,
        SymmetryType::MirrorText,
        SymmetryType::MirrorNames,
        SymmetryType::AntonymNames,
    ];

    /// Short code embedded in group identifiers and DNS claims.
    pub fn code(self) -> &'static str {
        match self {
            SymmetryType::Palindrome => "a",
            SymmetryType::Flip180 => "b",
            SymmetryType::DoubleFlip180 => "c",
            SymmetryType::MirrorText => "d",
            SymmetryType::MirrorNames => "e",
            SymmetryType::AntonymNames => "f",
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            SymmetryType::Palindrome => "Palindrome",
            SymmetryType::Flip180 => "Flip180",
            SymmetryType::DoubleFlip180 => "DoubleFlip180",
            SymmetryType::MirrorText => "MirrorText",
            SymmetryType::MirrorNames => "MirrorNames",
            SymmetryType::AntonymNames => "AntonymNames",
        }
    }

    /// Look up a type by its short code.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }
}

impl fmt::Display for SymmetryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SymmetryType {
    type Err = SunsError;

    /// Accepts either the short code or the human name (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::from_code(s)
            .or_else(|| {
                Self::ALL
                    .into_iter()
                    .find(|t| t.name().eq_ignore_ascii_case(s))
            })
            .ok_or_else(|| SunsError::Input(format!("unknown symmetry type {s:?}")))
    }
}

impl Serialize for SymmetryType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for SymmetryType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Primary key of a [`DomainRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    /// Group the hostname belongs to.
    #[serde(rename = "GroupID")]
    pub group_id: String,
    /// Hostname within the group.
    #[serde(rename = "Hostname")]
    pub hostname: String,
}

impl RecordKey {
    /// Build a key from its parts.
    pub fn new(group_id: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            hostname: hostname.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group_id, self.hostname)
    }
}

/// One hostname's membership in an attested group.
///
/// `rev` starts at 1 on first insert and increases by one on every successful
/// mutating write; a value of 0 means the record has never been stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DomainRecord {
    /// Owner string the group identifier was derived from.
    pub owner: String,
    /// Claimed symmetry.
    #[serde(rename = "Type")]
    pub symmetry: SymmetryType,
    /// Member hostname.
    pub hostname: String,
    /// Canonical group identifier.
    #[serde(rename = "GroupID")]
    pub group_id: String,
    /// Last time the group attested valid.
    pub validate_time: DateTime<Utc>,
    /// Optimistic concurrency revision.
    #[serde(default)]
    pub rev: u64,
}

impl DomainRecord {
    /// Create a record that has not been stored yet.
    pub fn new(
        owner: impl Into<String>,
        symmetry: SymmetryType,
        hostname: impl Into<String>,
        group_id: impl Into<String>,
        validate_time: DateTime<Utc>,
    ) -> Self {
        Self {
            owner: owner.into(),
            symmetry,
            hostname: hostname.into(),
            group_id: group_id.into(),
            validate_time,
            rev: 0,
        }
    }

    /// Primary key of this record.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.group_id.clone(), self.hostname.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique_and_round_trip() {
        for t in SymmetryType::ALL {
            assert_eq!(SymmetryType::from_code(t.code()), Some(t));
            assert_eq!(t.name().parse::<SymmetryType>().unwrap(), t);
        }
    }

    #[test]
    fn test_parse_accepts_code_or_case_insensitive_name() {
        assert_eq!("a".parse::<SymmetryType>().unwrap(), SymmetryType::Palindrome);
        assert_eq!(
            "mirrornames".parse::<SymmetryType>().unwrap(),
            SymmetryType::MirrorNames
        );
        assert!("z".parse::<SymmetryType>().is_err());
    }

    #[test]
    fn test_record_json_uses_external_field_names() {
        let record = DomainRecord::new(
            "o",
            SymmetryType::Flip180,
            "sos",
            "v1:b:x:y",
            "2024-01-01T00:00:00Z".parse().unwrap(),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["Owner"], "o");
        assert_eq!(json["Type"], "b");
        assert_eq!(json["GroupID"], "v1:b:x:y");
        assert_eq!(json["Rev"], 0);

        let back: DomainRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_record_key_display() {
        assert_eq!(RecordKey::new("g", "h.example").to_string(), "g/h.example");
    }
}
