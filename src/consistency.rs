//! Cross-claim and cross-record consistency checks.

use crate::error::{Result, SunsError};
use crate::group_id::{self, ParsedGroupId};
use crate::record::{DomainRecord, SymmetryType};

/// Fields every record of a well-formed group shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBase {
    /// Common owner.
    pub owner: String,
    /// Common group identifier.
    pub group_id: String,
    /// Common symmetry type.
    pub symmetry: SymmetryType,
}

/// Check that every claim carries the same owner hash as the first one.
pub fn check_consistency(claims: &[ParsedGroupId]) -> Result<()> {
    let Some((first, rest)) = claims.split_first() else {
        return Ok(());
    };

    for (offset, claim) in rest.iter().enumerate() {
        if claim.owner_hash != first.owner_hash {
            return Err(SunsError::Consistency(format!(
                "claim {} owner hash mismatch: expected {}, got {}",
                offset + 1,
                first.owner_hash,
                claim.owner_hash
            )));
        }
    }
    Ok(())
}

/// Check that records agree on owner, type and group id, and that the group id
/// is the canonical one for their hostnames.
pub fn validate_base(records: &[DomainRecord]) -> Result<GroupBase> {
    let Some(first) = records.first() else {
        return Err(SunsError::Input("no records to validate".into()));
    };

    for record in &records[1..] {
        if record.owner != first.owner {
            return Err(SunsError::Consistency(format!(
                "record {} owner {:?} differs from {:?}",
                record.hostname, record.owner, first.owner
            )));
        }
        if record.symmetry != first.symmetry {
            return Err(SunsError::Consistency(format!(
                "record {} type {} differs from {}",
                record.hostname, record.symmetry, first.symmetry
            )));
        }
        if record.group_id != first.group_id {
            return Err(SunsError::Consistency(format!(
                "record {} group id {} differs from {}",
                record.hostname, record.group_id, first.group_id
            )));
        }
    }

    let hostnames: Vec<&str> = records.iter().map(|r| r.hostname.as_str()).collect();
    let expected = group_id::calculate(&first.owner, first.symmetry.code(), &hostnames)?;
    if expected != first.group_id {
        return Err(SunsError::Consistency(format!(
            "group id {} does not match computed {}",
            first.group_id, expected
        )));
    }

    Ok(GroupBase {
        owner: first.owner.clone(),
        group_id: first.group_id.clone(),
        symmetry: first.symmetry,
    })
}
