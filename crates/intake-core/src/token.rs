//! Signed, expiring access tokens.
//!
//! A token is `<payload>.<signature>` where both halves are URL-safe base64
//! without padding. The payload is a compact JSON object carrying the form
//! kind, patient id, clinic id, issue time (unix seconds) and a random nonce.
//! The signature is HMAC-SHA256 over the encoded payload text, so any change
//! to the payload segment invalidates the token.
//!
//! Nothing is stored server-side. Validity is computed from the signature and
//! the embedded issue time only, which means tokens cannot be revoked before
//! they expire.
//!
//! # Example
//!
//! ```
//! use intake_core::{FormKind, TokenCodec};
//!
//! let codec = TokenCodec::new("server-secret").unwrap();
//! let token = codec.issue(FormKind::Pediatric, "APPT-100", "clinic-7");
//! let claims = codec.validate(token.as_str()).unwrap();
//! assert_eq!(claims.patient_id, "APPT-100");
//! assert_eq!(claims.form_kind, FormKind::Pediatric);
//! ```

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use time::{Duration, OffsetDateTime};

use crate::error::TokenError;
use crate::form::FormKind;

type HmacSha256 = Hmac<Sha256>;

/// Validity window of a freshly issued link.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::hours(24);

/// Longest patient or clinic identifier, in bytes, that a link may carry.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Payload bytes besides the two identifiers, with room to spare.
const PAYLOAD_OVERHEAD: usize = 96;

/// JSON escapes a control byte as `\u00XX`.
const MAX_ESCAPED_BYTE_LEN: usize = 6;

const MAX_PAYLOAD_LEN: usize = 2 * MAX_IDENTIFIER_LEN * MAX_ESCAPED_BYTE_LEN + PAYLOAD_OVERHEAD;

/// Base64 of a 32-byte HMAC-SHA256 tag without padding.
const SIGNATURE_LEN: usize = 43;

/// Longest token `issue` can produce for identifiers within
/// [`MAX_IDENTIFIER_LEN`]; anything longer is not ours.
const MAX_TOKEN_LEN: usize = (MAX_PAYLOAD_LEN * 4).div_ceil(3) + 1 + SIGNATURE_LEN;

const SEPARATOR: char = '.';

/// The secret key was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Token secret must not be empty")]
pub struct InvalidSecret;

/// Generate a random 256-bit secret encoded as hex.
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    hex::encode(bytes)
}

/// An issued token string. Opaque to everyone but [`TokenCodec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix that is safe to put in logs.
    pub fn log_prefix(&self) -> &str {
        log_prefix(&self.0)
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Truncate a raw token string for logging.
pub fn log_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(12)
        .map(|(idx, _)| idx)
        .unwrap_or(token.len());
    &token[..end]
}

/// Fields recovered from a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub form_kind: FormKind,
    pub patient_id: String,
    pub clinic_id: String,
    pub issued_at: OffsetDateTime,
}

#[derive(Debug, Deserialize, Serialize)]
struct TokenPayload {
    #[serde(rename = "k")]
    form_kind: FormKind,
    #[serde(rename = "p")]
    patient_id: String,
    #[serde(rename = "c")]
    clinic_id: String,
    #[serde(rename = "iat")]
    issued_at: i64,
    #[serde(rename = "n")]
    nonce: String,
}

/// Issues and validates access tokens with a server-held secret.
///
/// The codec is immutable after construction and safe to share across
/// request handlers behind an `Arc`.
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
    ttl: Duration,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec keyed with `secret` and the default 24 hour window.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, InvalidSecret> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(InvalidSecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| InvalidSecret)?;
        Ok(Self {
            mac,
            ttl: DEFAULT_TOKEN_TTL,
        })
    }

    /// Override the validity window.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token stamped with the current time.
    ///
    /// Identifiers longer than [`MAX_IDENTIFIER_LEN`] bytes may yield a token
    /// that [`validate`](Self::validate) refuses; [`LinkIssuer`](crate::LinkIssuer)
    /// rejects them up front.
    pub fn issue(&self, form_kind: FormKind, patient_id: &str, clinic_id: &str) -> AccessToken {
        self.issue_at(form_kind, patient_id, clinic_id, OffsetDateTime::now_utc())
    }

    /// Issue a token stamped with `issued_at`.
    pub fn issue_at(
        &self,
        form_kind: FormKind,
        patient_id: &str,
        clinic_id: &str,
        issued_at: OffsetDateTime,
    ) -> AccessToken {
        let nonce: [u8; 8] = rand::thread_rng().r#gen();
        let payload = json!({
            "k": form_kind.as_str(),
            "p": patient_id,
            "c": clinic_id,
            "iat": issued_at.unix_timestamp(),
            "n": hex::encode(nonce),
        })
        .to_string();

        let encoded = URL_SAFE_NO_PAD.encode(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(self.sign(&encoded));
        AccessToken(format!("{encoded}{SEPARATOR}{signature}"))
    }

    /// Validate a token against the current time.
    pub fn validate(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.validate_at(token, OffsetDateTime::now_utc())
    }

    /// Validate a token and require it to be bound to `expected`.
    ///
    /// A token for the other form variant is reported as [`TokenError::Invalid`].
    pub fn validate_for(&self, token: &str, expected: FormKind) -> Result<TokenClaims, TokenError> {
        let claims = self.validate(token)?;
        if claims.form_kind != expected {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }

    /// Validate a token as if the current time were `now`.
    pub fn validate_at(&self, token: &str, now: OffsetDateTime) -> Result<TokenClaims, TokenError> {
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            return Err(TokenError::Malformed);
        }
        let (encoded, signature) = token.split_once(SEPARATOR).ok_or(TokenError::Malformed)?;
        if encoded.is_empty() || signature.is_empty() || signature.contains(SEPARATOR) {
            return Err(TokenError::Malformed);
        }

        // A signature that does not even decode cannot match.
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Invalid)?;
        let mut mac = self.mac.clone();
        mac.update(encoded.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::Invalid)?;

        let raw = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| TokenError::Malformed)?;
        let payload: TokenPayload =
            serde_json::from_slice(&raw).map_err(|_| TokenError::Malformed)?;
        let issued_at = OffsetDateTime::from_unix_timestamp(payload.issued_at)
            .map_err(|_| TokenError::Malformed)?;

        if now - issued_at > self.ttl {
            return Err(TokenError::Expired);
        }

        Ok(TokenClaims {
            form_kind: payload.form_kind,
            patient_id: payload.patient_id,
            clinic_id: payload.clinic_id,
            issued_at,
        })
    }

    /// When a token issued at `issued_at` stops being accepted.
    pub fn expires_at(&self, issued_at: OffsetDateTime) -> OffsetDateTime {
        issued_at + self.ttl
    }

    fn sign(&self, encoded: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(encoded.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn codec() -> TokenCodec {
        TokenCodec::new("test-secret-key").unwrap()
    }

    #[test]
    fn round_trip_within_window() {
        let codec = codec();
        let issued = datetime!(2026-03-01 09:00 UTC);
        for kind in FormKind::ALL {
            let token = codec.issue_at(kind, "P1", "C1", issued);
            let claims = codec
                .validate_at(token.as_str(), issued + Duration::hours(23))
                .unwrap();
            assert_eq!(claims.form_kind, kind);
            assert_eq!(claims.patient_id, "P1");
            assert_eq!(claims.clinic_id, "C1");
            assert_eq!(claims.issued_at, issued);
        }
    }

    #[test]
    fn longest_identifiers_round_trip() {
        let codec = codec();
        let issued = datetime!(2026-03-01 09:00 UTC);
        // Control bytes take the most room once JSON-escaped.
        let patient_id = "\u{1}".repeat(MAX_IDENTIFIER_LEN);
        let clinic_id = "A".repeat(MAX_IDENTIFIER_LEN);
        let token = codec.issue_at(FormKind::Pediatric, &patient_id, &clinic_id, issued);
        assert!(token.as_str().len() <= MAX_TOKEN_LEN);

        let claims = codec.validate_at(token.as_str(), issued).unwrap();
        assert_eq!(claims.patient_id, patient_id);
        assert_eq!(claims.clinic_id, clinic_id);
    }

    #[test]
    fn exactly_at_expiry_is_still_valid() {
        let codec = codec();
        let issued = datetime!(2026-03-01 09:00 UTC);
        let token = codec.issue_at(FormKind::Standard, "P1", "C1", issued);
        assert!(codec.validate_at(token.as_str(), issued + DEFAULT_TOKEN_TTL).is_ok());
    }

    #[test]
    fn expired_after_window() {
        let codec = codec();
        let issued = datetime!(2026-03-01 09:00 UTC);
        let token = codec.issue_at(FormKind::Standard, "P1", "C1", issued);
        let err = codec
            .validate_at(token.as_str(), issued + DEFAULT_TOKEN_TTL + Duration::seconds(1))
            .unwrap_err();
        assert_eq!(err, TokenError::Expired);
    }

    #[test]
    fn custom_ttl_is_honoured() {
        let codec = codec().with_ttl(Duration::minutes(30));
        let issued = datetime!(2026-03-01 09:00 UTC);
        let token = codec.issue_at(FormKind::Pediatric, "P1", "C1", issued);
        assert!(codec.validate_at(token.as_str(), issued + Duration::minutes(29)).is_ok());
        assert_eq!(
            codec.validate_at(token.as_str(), issued + Duration::minutes(31)),
            Err(TokenError::Expired)
        );
        assert_eq!(codec.expires_at(issued), issued + Duration::minutes(30));
    }

    #[test]
    fn mutating_any_byte_invalidates() {
        let codec = codec();
        let issued = datetime!(2026-03-01 09:00 UTC);
        let token = codec.issue_at(FormKind::Standard, "P1", "C1", issued).to_string();
        let now = issued + Duration::hours(1);

        for (idx, ch) in token.char_indices() {
            if ch == SEPARATOR {
                continue;
            }
            let replacement = if ch == 'A' { 'B' } else { 'A' };
            let mut mutated = token.clone();
            mutated.replace_range(idx..idx + 1, &replacement.to_string());
            assert_eq!(
                codec.validate_at(&mutated, now),
                Err(TokenError::Invalid),
                "mutation at {idx} was accepted"
            );
        }
    }

    #[test]
    fn other_secret_is_rejected() {
        let issued = datetime!(2026-03-01 09:00 UTC);
        let token = codec().issue_at(FormKind::Standard, "P1", "C1", issued);
        let other = TokenCodec::new("another-secret").unwrap();
        assert_eq!(
            other.validate_at(token.as_str(), issued),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn structural_garbage_is_malformed() {
        let codec = codec();
        for garbage in ["", "no-separator", ".sig", "payload.", "a.b.c"] {
            assert_eq!(codec.validate(garbage), Err(TokenError::Malformed), "{garbage}");
        }
        let long = "a".repeat(MAX_TOKEN_LEN + 1);
        assert_eq!(codec.validate(&long), Err(TokenError::Malformed));
    }

    #[test]
    fn signed_but_undecodable_payload_is_malformed() {
        let codec = codec();
        let encoded = URL_SAFE_NO_PAD.encode(b"not json");
        let signature = URL_SAFE_NO_PAD.encode(codec.sign(&encoded));
        let token = format!("{encoded}.{signature}");
        assert_eq!(codec.validate(&token), Err(TokenError::Malformed));
    }

    #[test]
    fn tokens_are_unique_per_issue() {
        let codec = codec();
        let issued = datetime!(2026-03-01 09:00 UTC);
        let a = codec.issue_at(FormKind::Standard, "P1", "C1", issued);
        let b = codec.issue_at(FormKind::Standard, "P1", "C1", issued);
        assert_ne!(a, b);
    }

    #[test]
    fn validate_for_rejects_other_form_kind() {
        let codec = codec();
        let token = codec.issue(FormKind::Standard, "P1", "C1");
        assert!(codec.validate_for(token.as_str(), FormKind::Standard).is_ok());
        assert_eq!(
            codec.validate_for(token.as_str(), FormKind::Pediatric),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn token_is_url_safe() {
        let token = codec().issue(FormKind::Pediatric, "APPT 12/3?", "clinic&1");
        assert!(
            token
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        );
        assert_eq!(token.log_prefix().len(), 12);
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert_eq!(TokenCodec::new("").unwrap_err(), InvalidSecret);
        assert_eq!(generate_secret().len(), 64);
    }
}
