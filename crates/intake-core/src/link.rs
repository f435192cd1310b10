use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use url::Url;

use crate::error::LinkError;
use crate::form::FormKind;
use crate::token::{AccessToken, MAX_IDENTIFIER_LEN, TokenCodec};

/// A freshly minted shareable link.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedLink {
    pub url: String,
    #[serde(skip)]
    pub token: AccessToken,
    pub form_kind: FormKind,
    pub patient_id: String,
    pub clinic_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl IssuedLink {
    /// Whole hours the link stays valid.
    pub fn expires_in_hours(&self) -> i64 {
        (self.expires_at - self.issued_at).whole_hours()
    }
}

/// Builds form URLs around tokens minted by a [`TokenCodec`].
#[derive(Debug, Clone)]
pub struct LinkIssuer {
    codec: Arc<TokenCodec>,
}

impl LinkIssuer {
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }

    /// Mint a token and join it onto `base_url` with the form's route.
    ///
    /// Identifiers are trimmed and must be non-blank and at most
    /// [`MAX_IDENTIFIER_LEN`] bytes; whether they name the right patient is the
    /// caller's responsibility.
    pub fn generate_link(
        &self,
        form_kind: FormKind,
        patient_id: &str,
        clinic_id: &str,
        base_url: &str,
    ) -> Result<IssuedLink, LinkError> {
        self.generate_link_at(
            form_kind,
            patient_id,
            clinic_id,
            base_url,
            OffsetDateTime::now_utc(),
        )
    }

    pub fn generate_link_at(
        &self,
        form_kind: FormKind,
        patient_id: &str,
        clinic_id: &str,
        base_url: &str,
        now: OffsetDateTime,
    ) -> Result<IssuedLink, LinkError> {
        let patient_id = checked_identifier("patient_id", patient_id)?;
        let clinic_id = checked_identifier("clinic_id", clinic_id)?;
        let base = normalize_base_url(base_url)?;

        let token = self.codec.issue_at(form_kind, patient_id, clinic_id, now);
        let url = format!("{base}/{}/{}", form_kind.form_route(), token);

        tracing::debug!(
            patient_id = %patient_id,
            clinic_id = %clinic_id,
            form_kind = %form_kind,
            "Issued intake link"
        );

        Ok(IssuedLink {
            url,
            token,
            form_kind,
            patient_id: patient_id.to_string(),
            clinic_id: clinic_id.to_string(),
            issued_at: now,
            expires_at: self.codec.expires_at(now),
        })
    }
}

/// Trim an identifier and keep it short enough for the token to validate.
fn checked_identifier<'a>(field: &'static str, value: &'a str) -> Result<&'a str, LinkError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(LinkError::missing(field));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(LinkError::too_long(field, MAX_IDENTIFIER_LEN));
    }
    Ok(value)
}

/// Validate `base_url` as an absolute http(s) URL and strip trailing slashes.
fn normalize_base_url(base_url: &str) -> Result<&str, LinkError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed).map_err(|e| LinkError::invalid_base_url(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LinkError::invalid_base_url(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        )));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(LinkError::invalid_base_url(
            "base URL must not carry a query or fragment",
        ));
    }
    Ok(trimmed)
}
