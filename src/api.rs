//! JSON request/response shapes for attestation front ends.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::attest::{AttestResult, AttestationEngine, Verdict};
use crate::error::Result;
use crate::record::SymmetryType;

/// Body of an attest request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestRequest {
    /// Owner string the group identifier is derived from.
    pub owner: String,
    /// Symmetry type, by human name or short code.
    #[serde(rename = "type")]
    pub symmetry: String,
    /// Member domains.
    pub domains: Vec<String>,
}

/// Body of an attest response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestResponse {
    /// Whether the group attested valid.
    pub is_valid: bool,
    /// Identifier every domain must publish.
    pub expected_id: String,
    /// Number of claims discovered across all domains.
    pub group_id_count: usize,
    /// Why the group is not valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Human-readable summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&AttestResult> for AttestResponse {
    fn from(result: &AttestResult) -> Self {
        let message = match result.verdict {
            Verdict::Valid => format!("{} domain(s) attested", result.records.len()),
            Verdict::Invalid => "group is not valid".to_string(),
            Verdict::Unimplemented => "symmetry type cannot be verified yet".to_string(),
        };
        Self {
            is_valid: result.is_valid(),
            expected_id: result.expected_id.clone(),
            group_id_count: result.claims.iter().map(|c| c.claims.len()).sum(),
            error_message: result.error_message.clone(),
            message: Some(message),
        }
    }
}

impl AttestationEngine {
    /// Attest the group described by `request`, persisting it if valid.
    ///
    /// Errors mean validity could not be determined; an invalid group is an
    /// `Ok` response with `is_valid == false`.
    pub async fn handle_request(
        &self,
        request: &AttestRequest,
        cancel: &CancellationToken,
    ) -> Result<AttestResponse> {
        let symmetry: SymmetryType = request.symmetry.parse()?;
        let result = self
            .attest(&request.owner, symmetry, &request.domains, cancel)
            .await?;
        Ok(AttestResponse::from(&result))
    }
}
