use thiserror::Error;

/// Problems found while building a notification channel from configuration.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Failure to deliver one SMS message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmsError {
    #[error("Invalid phone number format: {0}")]
    InvalidPhone(String),

    #[error("SMS delivery failed: {status}")]
    Rejected { status: u16 },

    #[error("SMS service error: {0}")]
    Transport(String),
}

impl SmsError {
    /// Stable code returned to admin callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPhone(_) => "INVALID_PHONE",
            Self::Rejected { .. } => "DELIVERY_FAILED",
            Self::Transport(_) => "SMS_SERVICE_ERROR",
        }
    }
}
