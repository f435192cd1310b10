use axum::{
    Json,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, header::HOST},
};
use intake_core::{FormFields, FormKind, FormSchema, IssuedLink, token::log_prefix};
use serde::Deserialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::ApiError;
use crate::server::AppState;

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

fn rfc3339(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_default()
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "Patient Intake API",
        "version": SERVICE_VERSION,
        "endpoints": {
            "intake_form": "/intake/{token}",
            "pediatric_form": "/pediatric-intake/{token}",
            "submit": "/submit/{token}",
            "pediatric_submit": "/pediatric-submit/{token}",
            "admin_generate": "/admin/generate-link",
            "admin_generate_pediatric": "/admin/generate-pediatric-link",
            "admin_send_sms": "/admin/send-intake-link",
            "admin_sms_status": "/admin/sms-status",
            "health_check": "/health"
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": SERVICE_VERSION,
        "timestamp": rfc3339(OffsetDateTime::now_utc()),
        "components": {
            "token_codec": "operational",
            "form_normalizer": "operational",
            "webhook": if state.webhook_configured { "configured" } else { "not_configured" },
            "sms": if state.sms.is_some() { "enabled" } else { "disabled" },
        }
    }))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

// -------------------------
// Patient-facing form routes
// -------------------------

pub async fn intake_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> Result<Json<Value>, ApiError> {
    form_descriptor(&state, &headers, FormKind::Standard, &token)
}

pub async fn pediatric_intake_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> Result<Json<Value>, ApiError> {
    form_descriptor(&state, &headers, FormKind::Pediatric, &token)
}

/// What a client needs to render the form behind a valid link.
fn form_descriptor(
    state: &AppState,
    headers: &HeaderMap,
    kind: FormKind,
    token: &str,
) -> Result<Json<Value>, ApiError> {
    let codec = state.pipeline.codec();
    let claims = codec.validate_for(token, kind)?;
    tracing::info!(
        patient_id = %claims.patient_id,
        form_kind = %kind,
        token = %log_prefix(token),
        "Form link opened"
    );

    let base = state.request_base_url(headers);
    let sections: Vec<&str> = FormSchema::for_kind(kind).top_level_keys().collect();
    Ok(Json(json!({
        "form_type": kind.form_type(),
        "form_kind": kind,
        "form_version": kind.form_version(),
        "patient_id": claims.patient_id,
        "clinic_id": claims.clinic_id,
        "submit_url": format!("{base}/{}/{token}", kind.submit_route()),
        "issued_at": rfc3339(claims.issued_at),
        "expires_at": rfc3339(codec.expires_at(claims.issued_at)),
        "sections": sections,
    })))
}

pub async fn submit_intake(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    submit(&state, FormKind::Standard, &token, &body).await
}

pub async fn submit_pediatric_intake(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    submit(&state, FormKind::Pediatric, &token, &body).await
}

async fn submit(
    state: &AppState,
    kind: FormKind,
    token: &str,
    body: &[u8],
) -> Result<Json<Value>, ApiError> {
    let fields = FormFields::from_urlencoded(body);
    let receipt = state.pipeline.submit(token, kind, &fields).await?;

    // Forwarding problems are the clinic's to resolve; the patient is done.
    let message = if receipt.is_delivered() {
        "Thank you! Your information has been submitted successfully to the clinic."
    } else {
        "Your form has been received. The clinic will contact you shortly."
    };
    Ok(Json(json!({
        "accepted": true,
        "delivered": receipt.is_delivered(),
        "message": message,
        "patient_id": receipt.patient_id,
        "data_hash": receipt.data_hash,
        "submitted_at": rfc3339(receipt.submitted_at),
    })))
}

// -------------------------
// Admin routes
// -------------------------

#[derive(Debug, Deserialize)]
pub struct GenerateLinkRequest {
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub clinic_id: Option<String>,
}

pub async fn generate_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<GenerateLinkRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    issue_admin_link(&state, &headers, FormKind::Standard, payload)
}

pub async fn generate_pediatric_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<GenerateLinkRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    issue_admin_link(&state, &headers, FormKind::Pediatric, payload)
}

fn issue_admin_link(
    state: &AppState,
    headers: &HeaderMap,
    kind: FormKind,
    payload: Result<Json<GenerateLinkRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let patient_id = req
        .patient_id
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("patient_id is required"))?;

    let link = state.issue_link(headers, kind, &patient_id, req.clinic_id.as_deref())?;
    tracing::info!(
        patient_id = %link.patient_id,
        clinic_id = %link.clinic_id,
        form_kind = %kind,
        "Generated intake link"
    );

    let recipient = match kind {
        FormKind::Standard => "the patient",
        FormKind::Pediatric => "the parent/guardian",
    };
    let hours = link.expires_in_hours();
    Ok(Json(json!({
        "success": true,
        "form_url": link.url,
        "patient_id": link.patient_id,
        "clinic_id": link.clinic_id,
        "form_type": kind.form_type(),
        "expires_in_hours": hours,
        "generated_at": rfc3339(link.issued_at),
        "expires_at": rfc3339(link.expires_at),
        "instructions": format!("Send this URL via SMS to {recipient}. Link expires in {hours} hours."),
    })))
}

#[derive(Debug, Deserialize)]
pub struct SendLinkRequest {
    #[serde(default)]
    pub patient_phone: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub clinic_id: Option<String>,
    #[serde(default)]
    pub clinic_name: Option<String>,
    #[serde(default)]
    pub form_type: Option<String>,
}

pub async fn send_intake_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SendLinkRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Some(sms) = state.sms.as_ref() else {
        return Err(ApiError::service_unavailable("SMS service is not available"));
    };
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let (Some(phone), Some(patient_id)) = (
        req.patient_phone.filter(|p| !p.trim().is_empty()),
        req.patient_id.filter(|p| !p.trim().is_empty()),
    ) else {
        return Err(ApiError::bad_request(
            "patient_phone and patient_id are required",
        ));
    };
    let kind = match req.form_type.as_deref() {
        None => FormKind::Standard,
        Some(raw) => raw
            .parse::<FormKind>()
            .map_err(|e| ApiError::bad_request(e.to_string()))?,
    };

    let link = state.issue_link(&headers, kind, &patient_id, req.clinic_id.as_deref())?;
    let receipt = sms
        .send_intake_link(
            &phone,
            &link.url,
            req.patient_name.as_deref(),
            req.clinic_name.as_deref(),
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Intake link sent successfully via SMS",
        "patient_id": link.patient_id,
        "sms_status": receipt,
        "form_url": link.url,
        "sent_at": rfc3339(receipt.sent_at),
    })))
}

pub async fn sms_status(State(state): State<AppState>) -> Json<Value> {
    match &state.sms {
        None => Json(json!({
            "sms_enabled": false,
            "status": "SMS service not configured",
        })),
        Some(channel) => Json(json!({
            "sms_enabled": true,
            "connection_status": channel.status(),
            "checked_at": rfc3339(OffsetDateTime::now_utc()),
        })),
    }
}

impl AppState {
    /// Base URL for links: configured value, else the request's Host.
    pub fn request_base_url(&self, headers: &HeaderMap) -> String {
        if let Some(base) = &self.base_url {
            return base.clone();
        }
        let host = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .filter(|h| !h.is_empty());
        match host {
            Some(host) => {
                let scheme = headers
                    .get("x-forwarded-proto")
                    .and_then(|v| v.to_str().ok())
                    .filter(|p| matches!(*p, "http" | "https"))
                    .unwrap_or("http");
                format!("{scheme}://{host}")
            }
            None => self.fallback_base_url.clone(),
        }
    }

    fn issue_link(
        &self,
        headers: &HeaderMap,
        kind: FormKind,
        patient_id: &str,
        clinic_id: Option<&str>,
    ) -> Result<IssuedLink, ApiError> {
        let clinic_id = clinic_id
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.clinic.default_for(kind));
        let base = self.request_base_url(headers);
        Ok(self
            .issuer
            .generate_link(kind, patient_id, clinic_id, &base)?)
    }
}
