use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use intake_core::{DispatchError, DispatchResult, EnvelopeSink, SubmissionEnvelope};
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use sha2::Sha256;
use url::Url;

use crate::error::NotificationError;

type HmacSha256 = Hmac<Sha256>;

/// Upper bound on one outbound POST.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying `sha256=<hex>` when a signing secret is configured.
pub const SIGNATURE_HEADER: &str = "X-Signature-256";

/// Where accepted submissions are posted.
#[derive(Clone)]
pub struct WebhookTarget {
    url: Url,
    signer: Option<HmacSha256>,
    headers: HeaderMap,
}

impl fmt::Debug for WebhookTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookTarget")
            .field("url", &self.url.as_str())
            .field("signed", &self.signer.is_some())
            .field("headers", &self.headers.len())
            .finish()
    }
}

impl WebhookTarget {
    pub fn new(url: &str) -> Result<Self, NotificationError> {
        let url = Url::parse(url)
            .map_err(|e| NotificationError::InvalidConfig(format!("webhook url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(NotificationError::InvalidConfig(format!(
                "webhook url must be http or https, got {}",
                url.scheme()
            )));
        }
        Ok(Self {
            url,
            signer: None,
            headers: HeaderMap::new(),
        })
    }

    /// Sign every body with HMAC-SHA256 under `secret`.
    pub fn with_secret(mut self, secret: &str) -> Result<Self, NotificationError> {
        if secret.is_empty() {
            return Err(NotificationError::InvalidConfig(
                "webhook secret must not be empty".into(),
            ));
        }
        let signer = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| NotificationError::InvalidConfig(e.to_string()))?;
        self.signer = Some(signer);
        Ok(self)
    }

    /// Add a static header sent with every request.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, NotificationError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| NotificationError::InvalidConfig(format!("header {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| NotificationError::InvalidConfig(format!("header {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn sign_payload(&self, payload: &[u8]) -> Option<String> {
        let mut mac = self.signer.clone()?;
        mac.update(payload);
        Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }
}

/// Posts submission envelopes to the configured workflow endpoint.
///
/// One attempt per envelope, bounded by the client timeout. Without a target
/// every dispatch reports `not_configured` and performs no I/O.
pub struct WebhookDispatcher {
    http_client: Client,
    target: Option<WebhookTarget>,
}

impl WebhookDispatcher {
    pub fn new(target: Option<WebhookTarget>, timeout: Duration) -> Result<Self, NotificationError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Client(e.to_string()))?;
        Ok(Self {
            http_client,
            target,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.target.is_some()
    }

    /// POST the envelope once and return the response status.
    pub async fn deliver(&self, envelope: &SubmissionEnvelope) -> Result<u16, DispatchError> {
        let target = self.target.as_ref().ok_or(DispatchError::NotConfigured)?;

        let payload = serde_json::to_vec(envelope)
            .map_err(|e| DispatchError::transport(format!("serialize envelope: {e}")))?;

        let mut request = self
            .http_client
            .post(target.url.clone())
            .headers(target.headers.clone())
            .header(CONTENT_TYPE, "application/json");

        if let Some(signature) = target.sign_payload(&payload) {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| DispatchError::transport(e.to_string()))?;

        // The response body is never read.
        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(DispatchError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl EnvelopeSink for WebhookDispatcher {
    async fn dispatch(&self, envelope: &SubmissionEnvelope) -> DispatchResult {
        let meta = envelope.metadata();
        match self.deliver(envelope).await {
            Ok(status) => {
                tracing::info!(
                    patient_id = %meta.patient_id,
                    status,
                    "Webhook accepted submission"
                );
                DispatchResult::delivered(status)
            }
            Err(DispatchError::NotConfigured) => {
                tracing::warn!(
                    patient_id = %meta.patient_id,
                    "Webhook not configured, submission not forwarded"
                );
                DispatchResult::not_configured()
            }
            Err(err) => {
                tracing::error!(
                    patient_id = %meta.patient_id,
                    error = %err,
                    "Webhook dispatch failed"
                );
                DispatchResult::failed(&err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::{FormKind, FormNormalizer, TokenClaims};
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn envelope() -> SubmissionEnvelope {
        let claims = TokenClaims {
            form_kind: FormKind::Standard,
            patient_id: "P1".into(),
            clinic_id: "C1".into(),
            issued_at: time::OffsetDateTime::now_utc(),
        };
        let fields = intake_core::FormFields::new()
            .with("first_name", "Jane")
            .with("last_name", "Doe")
            .with("date_of_birth", "1990-04-12")
            .with("phone", "713-555-0100")
            .with("street_address", "1 Main St")
            .with("city", "Houston")
            .with("state", "TX")
            .with("zip_code", "77002")
            .with("emergency_contact_name", "John Doe")
            .with("emergency_contact_phone", "713-555-0101")
            .with("emergency_contact_relationship", "Spouse")
            .with("reason_for_visit", "Checkup");
        let doc = FormNormalizer::new()
            .normalize(FormKind::Standard, &fields)
            .unwrap();
        SubmissionEnvelope::new(&claims, doc, "hash".into(), time::OffsetDateTime::now_utc())
    }

    #[test]
    fn signature_is_stable_and_prefixed() {
        let target = WebhookTarget::new("https://hooks.example.com/intake")
            .unwrap()
            .with_secret("secret123")
            .unwrap();
        let first = target.sign_payload(br#"{"test": "data"}"#).unwrap();
        let second = target.sign_payload(br#"{"test": "data"}"#).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("sha256="));
        assert_eq!(first.len(), "sha256=".len() + 64);
    }

    #[test]
    fn rejects_bad_targets() {
        assert!(WebhookTarget::new("not a url").is_err());
        assert!(WebhookTarget::new("ftp://example.com/x").is_err());
        let target = WebhookTarget::new("https://example.com/x").unwrap();
        assert!(target.clone().with_secret("").is_err());
        assert!(target.with_header("bad header", "v").is_err());
    }

    #[tokio::test]
    async fn unconfigured_dispatch_is_soft_failure() {
        let dispatcher = WebhookDispatcher::new(None, DEFAULT_WEBHOOK_TIMEOUT).unwrap();
        assert!(!dispatcher.is_configured());
        let result = dispatcher.dispatch(&envelope()).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("not_configured"));
        assert_eq!(result.status_code, None);
    }

    #[tokio::test]
    async fn posts_signed_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(header("x-api-key", "k1"))
            .and(header_exists("x-signature-256"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let target = WebhookTarget::new(&format!("{}/hook", server.uri()))
            .unwrap()
            .with_secret("s3cret")
            .unwrap()
            .with_header("x-api-key", "k1")
            .unwrap();
        let dispatcher = WebhookDispatcher::new(Some(target), DEFAULT_WEBHOOK_TIMEOUT).unwrap();

        let result = dispatcher.dispatch(&envelope()).await;
        assert!(result.success);
        assert_eq!(result.status_code, Some(200));

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["submission_metadata"]["patient_id"], "P1");
        assert_eq!(body["submission_metadata"]["form_version"], "2.0");
    }

    #[tokio::test]
    async fn non_2xx_is_reported_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(1)
            .mount(&server)
            .await;

        let target = WebhookTarget::new(&server.uri()).unwrap();
        let dispatcher = WebhookDispatcher::new(Some(target), DEFAULT_WEBHOOK_TIMEOUT).unwrap();

        let result = dispatcher.dispatch(&envelope()).await;
        assert!(!result.success);
        assert_eq!(result.status_code, Some(502));
        assert_eq!(result.error.as_deref(), Some("Webhook returned status 502"));
    }

    #[tokio::test]
    async fn rejection_carries_status_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(64 * 1024)))
            .mount(&server)
            .await;

        let target = WebhookTarget::new(&server.uri()).unwrap();
        let dispatcher = WebhookDispatcher::new(Some(target), DEFAULT_WEBHOOK_TIMEOUT).unwrap();

        let err = dispatcher.deliver(&envelope()).await.unwrap_err();
        assert_eq!(err, DispatchError::Rejected { status: 500 });
        assert_eq!(err.to_string(), "Webhook returned status 500");
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let target = WebhookTarget::new(&server.uri()).unwrap();
        let dispatcher = WebhookDispatcher::new(Some(target), Duration::from_millis(50)).unwrap();

        let result = dispatcher.dispatch(&envelope()).await;
        assert!(!result.success);
        assert_eq!(result.status_code, None);
        assert!(result.error.unwrap().starts_with("Transport failure"));
    }
}
