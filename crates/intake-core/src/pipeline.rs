//! Orchestration of one submission request.
//!
//! ```text
//! Received -> TokenValidated -> Normalized -> Hashed -> Dispatched -> Delivered
//!     |              |                                        \-> DispatchFailed
//!     \--------------+--> Rejected
//! ```
//!
//! A rejected submission never reaches the sink. Once the envelope is built
//! the submission counts as received, whatever the dispatch outcome.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use crate::dispatch::{DispatchResult, EnvelopeSink};
use crate::envelope::SubmissionEnvelope;
use crate::error::SubmissionError;
use crate::fields::FormFields;
use crate::form::FormKind;
use crate::integrity::IntegrityHasher;
use crate::normalize::FormNormalizer;
use crate::token::{TokenCodec, log_prefix};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStage {
    Received,
    TokenValidated,
    Normalized,
    Hashed,
    Dispatched,
    Delivered,
    DispatchFailed,
    Rejected,
}

impl fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Received => "received",
            Self::TokenValidated => "token_validated",
            Self::Normalized => "normalized",
            Self::Hashed => "hashed",
            Self::Dispatched => "dispatched",
            Self::Delivered => "delivered",
            Self::DispatchFailed => "dispatch_failed",
            Self::Rejected => "rejected",
        };
        f.write_str(label)
    }
}

/// What the caller learns about an accepted submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    /// `Delivered` or `DispatchFailed`.
    pub outcome: SubmissionStage,
    pub form_kind: FormKind,
    pub patient_id: String,
    pub clinic_id: String,
    pub data_hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
    pub dispatch: DispatchResult,
}

impl SubmissionReceipt {
    pub fn is_delivered(&self) -> bool {
        self.outcome == SubmissionStage::Delivered
    }
}

/// Runs validate -> normalize -> hash -> envelope -> dispatch.
#[derive(Clone)]
pub struct SubmissionPipeline {
    codec: Arc<TokenCodec>,
    normalizer: FormNormalizer,
    hasher: IntegrityHasher,
    sink: Arc<dyn EnvelopeSink>,
}

impl fmt::Debug for SubmissionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionPipeline")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl SubmissionPipeline {
    pub fn new(codec: Arc<TokenCodec>, sink: Arc<dyn EnvelopeSink>) -> Self {
        Self {
            codec,
            normalizer: FormNormalizer::new(),
            hasher: IntegrityHasher::new(),
            sink,
        }
    }

    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    /// Process a submission arriving on the route for `route_kind`.
    ///
    /// A token minted for the other form kind is rejected as invalid.
    pub async fn submit(
        &self,
        token: &str,
        route_kind: FormKind,
        fields: &FormFields,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        self.submit_at(token, route_kind, fields, OffsetDateTime::now_utc())
            .await
    }

    pub async fn submit_at(
        &self,
        token: &str,
        route_kind: FormKind,
        fields: &FormFields,
        now: OffsetDateTime,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let mut stage = SubmissionStage::Received;
        tracing::debug!(
            token = %log_prefix(token),
            route_kind = %route_kind,
            field_count = fields.len(),
            stage = %stage,
            "Submission received"
        );

        let claims = match self.codec.validate_at(token, now) {
            Ok(claims) if claims.form_kind == route_kind => claims,
            Ok(claims) => {
                tracing::warn!(
                    token = %log_prefix(token),
                    token_kind = %claims.form_kind,
                    route_kind = %route_kind,
                    stage = %SubmissionStage::Rejected,
                    "Token presented to the wrong form"
                );
                return Err(crate::error::TokenError::Invalid.into());
            }
            Err(err) => {
                tracing::warn!(
                    token = %log_prefix(token),
                    reason = err.kind(),
                    stage = %SubmissionStage::Rejected,
                    "Submission rejected: invalid token"
                );
                return Err(err.into());
            }
        };
        advance(&mut stage, SubmissionStage::TokenValidated, &claims.patient_id);

        let doc = match self.normalizer.normalize(claims.form_kind, fields) {
            Ok(doc) => doc,
            Err(err) => {
                tracing::warn!(
                    patient_id = %claims.patient_id,
                    field = %err.field,
                    stage = %SubmissionStage::Rejected,
                    "Submission rejected: validation failed"
                );
                return Err(err.into());
            }
        };
        advance(&mut stage, SubmissionStage::Normalized, &claims.patient_id);

        let data_hash = self.hasher.digest(&doc);
        advance(&mut stage, SubmissionStage::Hashed, &claims.patient_id);

        let envelope = SubmissionEnvelope::new(&claims, doc, data_hash.clone(), now);
        let dispatch = self.sink.dispatch(&envelope).await;
        advance(&mut stage, SubmissionStage::Dispatched, &claims.patient_id);

        let outcome = if dispatch.success {
            tracing::info!(
                patient_id = %claims.patient_id,
                clinic_id = %claims.clinic_id,
                form_version = claims.form_kind.form_version(),
                "Submission delivered"
            );
            SubmissionStage::Delivered
        } else if dispatch.is_not_configured() {
            tracing::info!(
                patient_id = %claims.patient_id,
                "Submission received, no webhook to forward it to"
            );
            SubmissionStage::DispatchFailed
        } else {
            tracing::warn!(
                patient_id = %claims.patient_id,
                status_code = ?dispatch.status_code,
                error = dispatch.error.as_deref().unwrap_or(""),
                "Submission received but not forwarded"
            );
            SubmissionStage::DispatchFailed
        };
        advance(&mut stage, outcome, &claims.patient_id);

        Ok(SubmissionReceipt {
            outcome,
            form_kind: claims.form_kind,
            patient_id: claims.patient_id,
            clinic_id: claims.clinic_id,
            data_hash,
            submitted_at: now,
            dispatch,
        })
    }
}

fn advance(stage: &mut SubmissionStage, next: SubmissionStage, patient_id: &str) {
    tracing::debug!(patient_id = %patient_id, from = %stage, to = %next, "Submission stage");
    *stage = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TokenError;
    use crate::normalize::tests::{pediatric_fields, standard_fields};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use time::Duration;
    use time::macros::datetime;

    struct RecordingSink {
        result: DispatchResult,
        seen: Mutex<Vec<SubmissionEnvelope>>,
    }

    impl RecordingSink {
        fn returning(result: DispatchResult) -> Arc<Self> {
            Arc::new(Self {
                result,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl EnvelopeSink for RecordingSink {
        async fn dispatch(&self, envelope: &SubmissionEnvelope) -> DispatchResult {
            self.seen.lock().unwrap().push(envelope.clone());
            self.result.clone()
        }
    }

    fn pipeline(sink: Arc<RecordingSink>) -> SubmissionPipeline {
        let codec = Arc::new(TokenCodec::new("pipeline-secret").unwrap());
        SubmissionPipeline::new(codec, sink)
    }

    #[tokio::test]
    async fn standard_submission_is_delivered() {
        let sink = RecordingSink::returning(DispatchResult::delivered(200));
        let pipeline = pipeline(sink.clone());
        let issued = datetime!(2026-05-01 08:00 UTC);
        let token = pipeline
            .codec()
            .issue_at(FormKind::Standard, "P1", "C1", issued);

        let receipt = pipeline
            .submit_at(
                token.as_str(),
                FormKind::Standard,
                &standard_fields(),
                issued + Duration::hours(2),
            )
            .await
            .unwrap();

        assert!(receipt.is_delivered());
        assert_eq!(receipt.patient_id, "P1");
        assert_eq!(sink.count(), 1);
        let envelope = sink.seen.lock().unwrap()[0].clone();
        assert_eq!(envelope.metadata().form_version, "2.0");
        assert_eq!(envelope.metadata().clinic_id, "C1");
        assert_eq!(envelope.metadata().data_hash, receipt.data_hash);
        assert_eq!(envelope.metadata().submitted_at, issued + Duration::hours(2));
    }

    #[tokio::test]
    async fn dispatch_failure_still_accepts_submission() {
        let sink = RecordingSink::returning(DispatchResult::not_configured());
        let pipeline = pipeline(sink.clone());
        let token = pipeline.codec().issue(FormKind::Pediatric, "P2", "C2");

        let receipt = pipeline
            .submit(token.as_str(), FormKind::Pediatric, &pediatric_fields())
            .await
            .unwrap();

        assert_eq!(receipt.outcome, SubmissionStage::DispatchFailed);
        assert!(receipt.dispatch.is_not_configured());
        assert_eq!(sink.count(), 1);
        let envelope = sink.seen.lock().unwrap()[0].clone();
        assert_eq!(envelope.metadata().form_version, "2.0_pediatric");
    }

    #[tokio::test]
    async fn missing_consent_never_dispatches() {
        let sink = RecordingSink::returning(DispatchResult::delivered(200));
        let pipeline = pipeline(sink.clone());
        let token = pipeline.codec().issue(FormKind::Pediatric, "P2", "C2");
        let fields: FormFields = pediatric_fields()
            .iter()
            .filter(|(k, _)| *k != "treatment_consent")
            .collect();

        let err = pipeline
            .submit(token.as_str(), FormKind::Pediatric, &fields)
            .await
            .unwrap_err();

        match err {
            SubmissionError::Validation(v) => assert_eq!(v.field, "consent.treatment_consent"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sink.count(), 0);
    }

    #[tokio::test]
    async fn token_failures_never_dispatch() {
        let sink = RecordingSink::returning(DispatchResult::delivered(200));
        let pipeline = pipeline(sink.clone());
        let issued = datetime!(2026-05-01 08:00 UTC);
        let token = pipeline
            .codec()
            .issue_at(FormKind::Standard, "P1", "C1", issued);

        let expired = pipeline
            .submit_at(
                token.as_str(),
                FormKind::Standard,
                &standard_fields(),
                issued + Duration::hours(25),
            )
            .await
            .unwrap_err();
        assert!(matches!(expired, SubmissionError::Token(TokenError::Expired)));

        let wrong_form = pipeline
            .submit_at(token.as_str(), FormKind::Pediatric, &pediatric_fields(), issued)
            .await
            .unwrap_err();
        assert!(matches!(wrong_form, SubmissionError::Token(TokenError::Invalid)));

        let garbage = pipeline
            .submit("garbage", FormKind::Standard, &standard_fields())
            .await
            .unwrap_err();
        assert!(matches!(garbage, SubmissionError::Token(TokenError::Malformed)));

        assert_eq!(sink.count(), 0);
    }
}
