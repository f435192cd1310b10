use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::normalize::NormalizedSubmission;
use crate::token::TokenClaims;

/// The document forwarded to the external workflow endpoint.
///
/// Built once per accepted submission and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionEnvelope {
    patient_information: NormalizedSubmission,
    submission_metadata: SubmissionMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    pub clinic_id: String,
    pub patient_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
    pub form_version: String,
    pub data_hash: String,
}

impl SubmissionEnvelope {
    pub fn new(
        claims: &TokenClaims,
        patient_information: NormalizedSubmission,
        data_hash: String,
        submitted_at: OffsetDateTime,
    ) -> Self {
        Self {
            patient_information,
            submission_metadata: SubmissionMetadata {
                clinic_id: claims.clinic_id.clone(),
                patient_id: claims.patient_id.clone(),
                submitted_at,
                form_version: claims.form_kind.form_version().to_string(),
                data_hash,
            },
        }
    }

    pub fn patient_information(&self) -> &NormalizedSubmission {
        &self.patient_information
    }

    pub fn metadata(&self) -> &SubmissionMetadata {
        &self.submission_metadata
    }
}
