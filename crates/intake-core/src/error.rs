//! Error types for the token lifecycle and the submission pipeline.
//!
//! Token failures are deliberately coarse when shown to a patient: every
//! [`TokenError`] renders the same [`TokenError::user_message`], while the
//! variant itself is kept for server-side logging.

/// Text shown to the submitter for any token failure.
pub const LINK_INVALID_MESSAGE: &str =
    "Invalid or expired form link. Please contact the clinic for a new link.";

/// Errors produced while decoding and verifying an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The token is not structurally a token (missing separator, bad payload encoding).
    #[error("Token malformed")]
    Malformed,

    /// The signature does not match the payload, or the token is bound to another form.
    #[error("Token signature invalid")]
    Invalid,

    /// The token was valid but its validity window has elapsed.
    #[error("Token expired")]
    Expired,
}

impl TokenError {
    /// The undifferentiated message safe to show to the submitter.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        LINK_INVALID_MESSAGE
    }

    /// Stable error code used in API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        "TOKEN_INVALID"
    }

    /// Short label for structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Invalid => "invalid",
            Self::Expired => "expired",
        }
    }
}

/// A submitted field failed the form schema.
///
/// `field` is the dotted path of the field in the normalized document, e.g.
/// `consent.treatment_consent`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn required(field: impl Into<String>) -> Self {
        Self::new(field, "This field is required.")
    }
}

/// Errors raised while building a shareable link.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("{field} is required")]
    MissingIdentifier { field: &'static str },

    #[error("{field} cannot be longer than {max} bytes")]
    IdentifierTooLong { field: &'static str, max: usize },

    #[error("Invalid base URL: {message}")]
    InvalidBaseUrl { message: String },
}

impl LinkError {
    #[must_use]
    pub fn missing(field: &'static str) -> Self {
        Self::MissingIdentifier { field }
    }

    #[must_use]
    pub fn too_long(field: &'static str, max: usize) -> Self {
        Self::IdentifierTooLong { field, max }
    }

    #[must_use]
    pub fn invalid_base_url(message: impl Into<String>) -> Self {
        Self::InvalidBaseUrl {
            message: message.into(),
        }
    }
}

/// Why a submission was rejected before anything was forwarded.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors raised by an outbound dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No endpoint is configured; nothing was sent.
    #[error("not_configured")]
    NotConfigured,

    /// The endpoint answered with a non-2xx status.
    #[error("Webhook returned status {status}")]
    Rejected { status: u16 },

    /// The request never produced a response (connect error, timeout, ...).
    #[error("Transport failure: {message}")]
    Transport { message: String },
}

impl DispatchError {
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}
