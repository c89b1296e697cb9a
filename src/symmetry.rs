//! Structural validators for each symmetry type.
//!
//! Dispatch is an exhaustive `match` over [`SymmetryType`]; a new variant does
//! not compile until it is given a rule here.

use tracing::warn;

use crate::consistency::{self, GroupBase};
use crate::error::{Result, SunsError};
use crate::record::{DomainRecord, SymmetryType};

/// Glyph pairs that map onto each other under a 180° rotation.
const FLIP_PAIRS: &[(char, char)] = &[
    ('a', 'ɐ'),
    ('b', 'q'),
    ('c', 'ɔ'),
    ('d', 'p'),
    ('e', 'ǝ'),
    ('f', 'ɟ'),
    ('g', 'ƃ'),
    ('h', 'ɥ'),
    ('i', 'ı'),
    ('j', 'ɾ'),
    ('k', 'ʞ'),
    ('l', 'l'),
    ('m', 'ɯ'),
    ('n', 'u'),
    ('o', 'o'),
    ('r', 'ɹ'),
    ('s', 's'),
    ('t', 'ʇ'),
    ('v', 'ʌ'),
    ('w', 'ʍ'),
    ('x', 'x'),
    ('y', 'ʎ'),
    ('z', 'z'),
    ('0', '0'),
    ('1', 'Ɩ'),
    ('2', 'ᄅ'),
    ('3', 'Ɛ'),
    ('4', 'ㄣ'),
    ('5', 'ϛ'),
    ('6', '9'),
    ('7', 'ㄥ'),
    ('8', '8'),
    ('.', '.'),
    ('-', '-'),
    ('_', '‾'),
];

fn flip_char(c: char) -> Option<char> {
    FLIP_PAIRS.iter().find_map(|&(a, b)| {
        if c == a {
            Some(b)
        } else if c == b {
            Some(a)
        } else {
            None
        }
    })
}

/// Rotate text by 180°: map every glyph through the rotation table and reverse.
///
/// Returns `None` if any character has no rotated counterpart.
pub fn flip180(text: &str) -> Option<String> {
    text.chars().rev().map(flip_char).collect()
}

/// True if `text` reads the same forwards and backwards, codepoint by codepoint.
pub fn is_palindrome(text: &str) -> bool {
    text.chars().eq(text.chars().rev())
}

/// True if the dot-separated labels of `a` are the labels of `b` in reverse order.
pub fn is_mirror_names(a: &str, b: &str) -> bool {
    let left: Vec<&str> = a.split('.').collect();
    let right: Vec<&str> = b.split('.').collect();
    left.len() == right.len() && left.iter().eq(right.iter().rev())
}

enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

fn check_arity(symmetry: SymmetryType, arity: Arity, actual: usize) -> Result<()> {
    let ok = match arity {
        Arity::Exactly(n) => actual == n,
        Arity::AtLeast(n) => actual >= n,
    };
    if ok {
        return Ok(());
    }
    let expected = match arity {
        Arity::Exactly(n) => format!("exactly {n}"),
        Arity::AtLeast(n) => format!("at least {n}"),
    };
    Err(SunsError::Structural(format!(
        "{symmetry} requires {expected} domain(s), got {actual}"
    )))
}

/// Validate a group's records: shared base fields first, then the symmetry rule.
///
/// Types without a rule yield [`SunsError::UnimplementedSymmetry`], never success.
pub fn validate(records: &[DomainRecord]) -> Result<GroupBase> {
    let base = consistency::validate_base(records)?;
    let hostnames: Vec<&str> = records.iter().map(|r| r.hostname.as_str()).collect();

    match base.symmetry {
        SymmetryType::Palindrome => {
            check_arity(base.symmetry, Arity::Exactly(1), hostnames.len())?;
            if !is_palindrome(hostnames[0]) {
                return Err(SunsError::Structural(format!(
                    "{} is not a palindrome",
                    hostnames[0]
                )));
            }
        }
        SymmetryType::Flip180 => {
            check_arity(base.symmetry, Arity::Exactly(1), hostnames.len())?;
            match flip180(hostnames[0]) {
                Some(flipped) if flipped == hostnames[0] => {}
                Some(flipped) => {
                    return Err(SunsError::Structural(format!(
                        "{} rotates to {flipped}",
                        hostnames[0]
                    )));
                }
                None => {
                    return Err(SunsError::Structural(format!(
                        "{} contains characters without a rotated form",
                        hostnames[0]
                    )));
                }
            }
        }
        SymmetryType::DoubleFlip180 => {
            check_arity(base.symmetry, Arity::Exactly(2), hostnames.len())?;
            let (a, b) = (hostnames[0], hostnames[1]);
            let flipped = flip180(&a.to_lowercase()).ok_or_else(|| {
                SunsError::Structural(format!("{a} contains characters without a rotated form"))
            })?;
            if flipped.to_lowercase() != b.to_lowercase() {
                return Err(SunsError::Structural(format!(
                    "{a} rotates to {flipped}, not {b}"
                )));
            }
        }
        SymmetryType::MirrorNames => {
            check_arity(base.symmetry, Arity::Exactly(2), hostnames.len())?;
            let (a, b) = (hostnames[0], hostnames[1]);
            if !is_mirror_names(a, b) {
                return Err(SunsError::Structural(format!(
                    "labels of {a} are not the reverse of {b}"
                )));
            }
        }
        SymmetryType::MirrorText => {
            check_arity(base.symmetry, Arity::Exactly(1), hostnames.len())?;
            warn!(group_id = %base.group_id, "no validator for mirror text symmetry");
            return Err(SunsError::UnimplementedSymmetry(base.symmetry));
        }
        SymmetryType::AntonymNames => {
            check_arity(base.symmetry, Arity::AtLeast(1), hostnames.len())?;
            warn!(group_id = %base.group_id, "no validator for antonym names symmetry");
            return Err(SunsError::UnimplementedSymmetry(base.symmetry));
        }
    }

    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group_id;
    use chrono::Utc;

    fn group(symmetry: SymmetryType, hostnames: &[&str]) -> Vec<DomainRecord> {
        let id = group_id::calculate("o", symmetry.code(), hostnames).unwrap();
        hostnames
            .iter()
            .map(|h| DomainRecord::new("o", symmetry, *h, id.clone(), Utc::now()))
            .collect()
    }

    #[test]
    fn test_flip_table_is_bijective() {
        let mut seen = std::collections::HashSet::new();
        for &(a, b) in FLIP_PAIRS {
            assert!(seen.insert(a) || a == b, "duplicate glyph {a}");
            if a != b {
                assert!(seen.insert(b), "duplicate glyph {b}");
            }
        }
    }

    #[test]
    fn test_flip_examples() {
        assert_eq!(flip180("sos").as_deref(), Some("sos"));
        assert_eq!(flip180("pods").as_deref(), Some("spod"));
        assert_eq!(flip180("suns").as_deref(), Some("suns"));
        assert_eq!(flip180("a!"), None);
    }

    #[test]
    fn test_flip_twice_is_identity() {
        for word in ["pods", "hello.world", "dns-123", "ɐqɔ"] {
            let once = flip180(word).unwrap();
            assert_eq!(flip180(&once).as_deref(), Some(word));
        }
    }

    #[test]
    fn test_palindrome() {
        for ok in ["racecar", "noon", "a.b.a"] {
            assert!(validate(&group(SymmetryType::Palindrome, &[ok])).is_ok(), "{ok}");
        }
        let err = validate(&group(SymmetryType::Palindrome, &["example.com"])).unwrap_err();
        assert!(matches!(err, SunsError::Structural(_)));
        assert!(err.to_string().contains("example.com"));
    }

    #[test]
    fn test_palindrome_has_no_normalization() {
        assert!(!is_palindrome("Aba"));
    }

    #[test]
    fn test_flip180_validator() {
        assert!(validate(&group(SymmetryType::Flip180, &["sos"])).is_ok());
        assert!(validate(&group(SymmetryType::Flip180, &["pods"])).is_err());
        assert!(validate(&group(SymmetryType::Flip180, &["so$"])).is_err());
    }

    #[test]
    fn test_double_flip_case_insensitive() {
        assert!(validate(&group(SymmetryType::DoubleFlip180, &["pods", "spod"])).is_ok());
        assert!(validate(&group(SymmetryType::DoubleFlip180, &["PODS", "spod"])).is_ok());
        assert!(validate(&group(SymmetryType::DoubleFlip180, &["pods", "pods"])).is_err());
    }

    #[test]
    fn test_mirror_names() {
        assert!(validate(&group(SymmetryType::MirrorNames, &["a.b.com", "com.b.a"])).is_ok());
        assert!(!is_mirror_names("a.b.com", "com.a"));
        assert!(validate(&group(SymmetryType::MirrorNames, &["a.b.com", "com.a"])).is_err());
    }

    #[test]
    fn test_mirror_names_paired_with_itself() {
        assert!(validate(&group(SymmetryType::MirrorNames, &["a.b.a", "a.b.a"])).is_ok());
        assert!(validate(&group(SymmetryType::MirrorNames, &["a.b.com", "a.b.com"])).is_err());
    }

    #[test]
    fn test_wrong_arity_is_named() {
        let err = validate(&group(SymmetryType::Palindrome, &["aba", "cdc"])).unwrap_err();
        assert!(err.to_string().contains("exactly 1"), "{err}");
        let err = validate(&group(SymmetryType::MirrorNames, &["a.b"])).unwrap_err();
        assert!(err.to_string().contains("got 1"), "{err}");
    }

    #[test]
    fn test_unimplemented_types_never_pass() {
        assert!(matches!(
            validate(&group(SymmetryType::MirrorText, &["wow"])),
            Err(SunsError::UnimplementedSymmetry(SymmetryType::MirrorText))
        ));
        assert!(matches!(
            validate(&group(SymmetryType::AntonymNames, &["hot.cold"])),
            Err(SunsError::UnimplementedSymmetry(SymmetryType::AntonymNames))
        ));
    }

    #[test]
    fn test_base_mismatch_fails_before_rule() {
        let mut records = group(SymmetryType::Palindrome, &["aba"]);
        records[0].group_id = group_id::calculate("other", "a", &["aba"]).unwrap();
        assert!(matches!(validate(&records), Err(SunsError::Consistency(_))));
    }
}
