use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::envelope::SubmissionEnvelope;
use crate::error::DispatchError;

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchResult {
    pub fn delivered(status_code: u16) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            error: None,
        }
    }

    pub fn not_configured() -> Self {
        Self::failed(&DispatchError::NotConfigured)
    }

    pub fn failed(err: &DispatchError) -> Self {
        let status_code = match err {
            DispatchError::Rejected { status, .. } => Some(*status),
            _ => None,
        };
        Self {
            success: false,
            status_code,
            error: Some(err.to_string()),
        }
    }

    pub fn is_not_configured(&self) -> bool {
        !self.success && self.error.as_deref() == Some("not_configured")
    }
}

impl From<Result<u16, DispatchError>> for DispatchResult {
    fn from(result: Result<u16, DispatchError>) -> Self {
        match result {
            Ok(status) => Self::delivered(status),
            Err(err) => Self::failed(&err),
        }
    }
}

/// Destination for accepted submissions.
///
/// Implementations make at most one delivery attempt and report the outcome;
/// they never retry.
#[async_trait]
pub trait EnvelopeSink: Send + Sync {
    async fn dispatch(&self, envelope: &SubmissionEnvelope) -> DispatchResult;
}
