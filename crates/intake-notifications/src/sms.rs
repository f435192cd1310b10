//! SMS delivery of intake links.
//!
//! The channel exists only when both a connection string and a sender number
//! are configured; [`SmsGate::from_config`] decides this once at startup.
//! Messages never carry PHI beyond the recipient's first name.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use url::Url;

use crate::error::{NotificationError, SmsError};

pub const DEFAULT_CLINIC_NAME: &str = "Healthcare Clinic";

const OPT_OUT_KEYWORDS: [&str; 5] = ["STOP", "QUIT", "UNSUBSCRIBE", "CANCEL", "END"];

/// SMS settings as they come out of configuration.
#[derive(Debug, Clone)]
pub struct SmsSettings {
    /// `endpoint=<url>;accesskey=<key>`
    pub connection_string: Option<String>,
    pub from_number: Option<String>,
    pub clinic_name: String,
    pub timeout: Duration,
}

impl Default for SmsSettings {
    fn default() -> Self {
        Self {
            connection_string: None,
            from_number: None,
            clinic_name: DEFAULT_CLINIC_NAME.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Format a US number as E.164 (`+1XXXXXXXXXX`).
pub fn format_phone_number(raw: &str) -> Result<String, SmsError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        10 => Ok(format!("+1{digits}")),
        11 if digits.starts_with('1') => Ok(format!("+{digits}")),
        _ => Err(SmsError::InvalidPhone(raw.to_string())),
    }
}

/// Phone number safe for logs: the first six characters then `****`.
pub fn mask_phone(phone: &str) -> String {
    let visible: String = phone.chars().take(6).collect();
    format!("{visible}****")
}

/// Body of the message carrying a form link.
pub fn intake_link_message(form_url: &str, patient_name: Option<&str>, clinic_name: &str) -> String {
    let greeting = match patient_name.and_then(|name| name.split_whitespace().next()) {
        Some(first) => format!("Hello {first},"),
        None => "Hello,".to_string(),
    };
    format!(
        "{greeting}\n\n\
         {clinic_name} has sent you a secure patient intake form. Please fill it out before your appointment:\n\n\
         {form_url}\n\n\
         This secure link expires in 24 hours for your privacy and security.\n\n\
         If you have questions, please call the clinic directly.\n\n\
         Reply STOP to opt out."
    )
}

pub fn reminder_message(clinic_name: &str) -> String {
    format!(
        "Reminder from {clinic_name}:\n\n\
         You have an upcoming appointment. If you haven't completed your intake form yet, please do so as soon as possible.\n\n\
         Call the clinic if you need a new form link or have questions.\n\n\
         Reply STOP to opt out."
    )
}

/// Whether an inbound message asks to stop receiving texts.
pub fn is_opt_out(message: &str) -> bool {
    let normalized = message.trim().to_ascii_uppercase();
    OPT_OUT_KEYWORDS.contains(&normalized.as_str())
}

/// Provider that actually moves a text message.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    /// Send `body` and return the provider's message id, if any.
    async fn send(&self, from: &str, to: &str, body: &str) -> Result<Option<String>, SmsError>;

    fn name(&self) -> &'static str;
}

/// JSON relay transport: `POST {endpoint}/sms` with a bearer access key.
pub struct HttpSmsTransport {
    http_client: Client,
    endpoint: Url,
    access_key: String,
}

impl fmt::Debug for HttpSmsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSmsTransport")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    #[serde(default)]
    message_id: Option<String>,
}

impl HttpSmsTransport {
    /// Parse `endpoint=<url>;accesskey=<key>` (keys are case-insensitive).
    pub fn from_connection_string(
        connection_string: &str,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let mut endpoint = None;
        let mut access_key = None;
        for part in connection_string.split(';').filter(|p| !p.trim().is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                NotificationError::InvalidConfig("connection string part without '='".into())
            })?;
            match key.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value.trim().to_string()),
                "accesskey" => access_key = Some(value.trim().to_string()),
                _ => {}
            }
        }

        let endpoint = endpoint
            .ok_or_else(|| NotificationError::InvalidConfig("connection string lacks endpoint".into()))?;
        let access_key = access_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| NotificationError::InvalidConfig("connection string lacks accesskey".into()))?;
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| NotificationError::InvalidConfig(format!("sms endpoint: {e}")))?;

        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
            access_key,
        })
    }

    fn send_url(&self) -> String {
        format!("{}/sms", self.endpoint.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl SmsTransport for HttpSmsTransport {
    async fn send(&self, from: &str, to: &str, body: &str) -> Result<Option<String>, SmsError> {
        let response = self
            .http_client
            .post(self.send_url())
            .bearer_auth(&self.access_key)
            .json(&json!({
                "from": from,
                "to": [to],
                "message": body,
            }))
            .send()
            .await
            .map_err(|e| SmsError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SmsError::Rejected {
                status: status.as_u16(),
            });
        }

        // An empty or non-JSON 2xx body is still a successful send.
        let message_id = response
            .json::<RelayResponse>()
            .await
            .ok()
            .and_then(|r| r.message_id);
        Ok(message_id)
    }

    fn name(&self) -> &'static str {
        "http-relay"
    }
}

/// Outcome of a successful send.
#[derive(Debug, Clone, Serialize)]
pub struct SmsReceipt {
    pub message_id: Option<String>,
    /// Masked recipient number.
    pub to: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
}

/// Connectivity report for the admin status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SmsStatus {
    pub connection_status: &'static str,
    pub service: &'static str,
    pub from_number: String,
    #[serde(with = "time::serde::rfc3339")]
    pub tested_at: OffsetDateTime,
}

/// A configured SMS sender.
#[derive(Clone)]
pub struct SmsChannel {
    transport: Arc<dyn SmsTransport>,
    from_number: String,
    clinic_name: String,
}

impl fmt::Debug for SmsChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmsChannel")
            .field("transport", &self.transport.name())
            .field("from_number", &mask_phone(&self.from_number))
            .field("clinic_name", &self.clinic_name)
            .finish()
    }
}

impl SmsChannel {
    pub fn new(
        transport: Arc<dyn SmsTransport>,
        from_number: impl Into<String>,
        clinic_name: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            from_number: from_number.into(),
            clinic_name: clinic_name.into(),
        }
    }

    pub fn from_number(&self) -> &str {
        &self.from_number
    }

    pub fn clinic_name(&self) -> &str {
        &self.clinic_name
    }

    /// Text a form link to a patient or guardian.
    pub async fn send_intake_link(
        &self,
        phone: &str,
        form_url: &str,
        patient_name: Option<&str>,
        clinic_name: Option<&str>,
    ) -> Result<SmsReceipt, SmsError> {
        let clinic_name = clinic_name.unwrap_or(&self.clinic_name);
        let body = intake_link_message(form_url, patient_name, clinic_name);
        self.deliver(phone, &body, "Intake link SMS").await
    }

    pub async fn send_reminder(
        &self,
        phone: &str,
        clinic_name: Option<&str>,
    ) -> Result<SmsReceipt, SmsError> {
        let body = reminder_message(clinic_name.unwrap_or(&self.clinic_name));
        self.deliver(phone, &body, "Reminder SMS").await
    }

    pub fn status(&self) -> SmsStatus {
        SmsStatus {
            connection_status: "healthy",
            service: self.transport.name(),
            from_number: self.from_number.clone(),
            tested_at: OffsetDateTime::now_utc(),
        }
    }

    async fn deliver(&self, phone: &str, body: &str, what: &str) -> Result<SmsReceipt, SmsError> {
        let to = format_phone_number(phone)?;
        let masked = mask_phone(&to);
        match self.transport.send(&self.from_number, &to, body).await {
            Ok(message_id) => {
                tracing::info!(to = %masked, "{what} sent");
                Ok(SmsReceipt {
                    message_id,
                    to: masked,
                    sent_at: OffsetDateTime::now_utc(),
                })
            }
            Err(err) => {
                tracing::error!(to = %masked, error = %err, "{what} failed");
                Err(err)
            }
        }
    }
}

/// Startup capability check for the SMS channel.
pub struct SmsGate;

impl SmsGate {
    /// Build the channel when it is fully configured.
    ///
    /// Missing or unusable settings disable the feature; they never fail
    /// startup.
    pub fn from_config(settings: &SmsSettings) -> Option<SmsChannel> {
        let connection_string = non_blank(settings.connection_string.as_deref());
        let from_number = non_blank(settings.from_number.as_deref());
        let (Some(connection_string), Some(from_number)) = (connection_string, from_number) else {
            tracing::info!("SMS channel disabled: connection string or sender number not configured");
            return None;
        };

        match HttpSmsTransport::from_connection_string(connection_string, settings.timeout) {
            Ok(transport) => {
                tracing::info!(from = %mask_phone(from_number), "SMS channel enabled");
                Some(SmsChannel::new(
                    Arc::new(transport),
                    from_number,
                    settings.clinic_name.clone(),
                ))
            }
            Err(err) => {
                tracing::warn!(error = %err, "SMS channel disabled: unusable configuration");
                None
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
