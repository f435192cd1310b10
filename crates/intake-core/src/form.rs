use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The intake form variants a link can grant access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormKind {
    Standard,
    Pediatric,
}

impl FormKind {
    pub const ALL: [FormKind; 2] = [FormKind::Standard, FormKind::Pediatric];

    /// Version string stamped into `submission_metadata.form_version`.
    pub fn form_version(&self) -> &'static str {
        match self {
            Self::Standard => "2.0",
            Self::Pediatric => "2.0_pediatric",
        }
    }

    /// Path segment of the page that serves the form.
    pub fn form_route(&self) -> &'static str {
        match self {
            Self::Standard => "intake",
            Self::Pediatric => "pediatric-intake",
        }
    }

    /// Path segment that accepts the completed form.
    pub fn submit_route(&self) -> &'static str {
        match self {
            Self::Standard => "submit",
            Self::Pediatric => "pediatric-submit",
        }
    }

    /// Form type label used in admin responses.
    pub fn form_type(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Pediatric => "pediatric_comprehensive",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Pediatric => "pediatric",
        }
    }
}

impl fmt::Display for FormKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown form kind: {0}")]
pub struct UnknownFormKind(pub String);

impl FromStr for FormKind {
    type Err = UnknownFormKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "s" => Ok(Self::Standard),
            "pediatric" | "pediatric_comprehensive" | "p" => Ok(Self::Pediatric),
            other => Err(UnknownFormKind(other.to_string())),
        }
    }
}
