use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{net::SocketAddr, time::Duration};

use intake_core::FormKind;
use intake_notifications::SmsSettings;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// Outbound workflow endpoint
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub clinic: ClinicConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        if let Some(base) = non_blank(&self.server.base_url) {
            check_http_url(base).map_err(|e| format!("server.base_url {e}"))?;
        }
        // Security validations
        if let Some(secret) = &self.security.secret_key {
            if secret.trim().is_empty() {
                return Err("security.secret_key must not be empty when set".into());
            }
        }
        if self.security.token_ttl_hours == 0 {
            return Err("security.token_ttl_hours must be > 0".into());
        }
        // Webhook validations
        if let Some(url) = non_blank(&self.webhook.url) {
            check_http_url(url).map_err(|e| format!("webhook.url {e}"))?;
        }
        if self.webhook.timeout_secs == 0 {
            return Err("webhook.timeout_secs must be > 0".into());
        }
        if self.sms.timeout_secs == 0 {
            return Err("sms.timeout_secs must be > 0".into());
        }
        // Clinic validations
        if self.clinic.default_clinic_id.trim().is_empty()
            || self.clinic.default_pediatric_clinic_id.trim().is_empty()
        {
            return Err("clinic default ids must not be empty".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    /// Configured public base URL, if any.
    pub fn base_url(&self) -> Option<&str> {
        non_blank(&self.server.base_url)
    }

    /// Base URL derived from the listen address.
    pub fn fallback_base_url(&self) -> String {
        format!("http://{}:{}", self.server.host, self.server.port)
    }

    pub fn token_ttl(&self) -> time::Duration {
        time::Duration::hours(i64::from(self.security.token_ttl_hours))
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook.timeout_secs)
    }

    pub fn sms_settings(&self) -> SmsSettings {
        SmsSettings {
            connection_string: self.sms.connection_string.clone(),
            from_number: self.sms.from_number.clone(),
            clinic_name: self.sms.clinic_name.clone(),
            timeout: Duration::from_secs(self.sms.timeout_secs),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn check_http_url(raw: &str) -> Result<(), String> {
    let url = url::Url::parse(raw).map_err(|e| format!("is not a valid URL: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err("must use http or https".into());
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL used when building form links.
    /// If not set, the request's Host header is used.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    5001
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// HMAC key for link tokens. A random key is generated when absent,
    /// which invalidates outstanding links on restart.
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u32,
}

fn default_token_ttl_hours() -> u32 {
    24
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Absent means submissions are accepted but not forwarded.
    #[serde(default)]
    pub url: Option<String>,
    /// Enables the `X-Signature-256` header.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    intake_notifications::DEFAULT_WEBHOOK_TIMEOUT.as_secs()
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            secret: None,
            timeout_secs: default_timeout_secs(),
            headers: BTreeMap::new(),
        }
    }
}

impl WebhookConfig {
    pub fn endpoint(&self) -> Option<&str> {
        non_blank(&self.url)
    }

    pub fn signing_secret(&self) -> Option<&str> {
        non_blank(&self.secret)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    /// `endpoint=<url>;accesskey=<key>`
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default)]
    pub from_number: Option<String>,
    #[serde(default = "default_clinic_name")]
    pub clinic_name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_clinic_name() -> String {
    intake_notifications::DEFAULT_CLINIC_NAME.into()
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            from_number: None,
            clinic_name: default_clinic_name(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicConfig {
    #[serde(default = "default_clinic_id")]
    pub default_clinic_id: String,
    #[serde(default = "default_pediatric_clinic_id")]
    pub default_pediatric_clinic_id: String,
}

fn default_clinic_id() -> String {
    "default".into()
}
fn default_pediatric_clinic_id() -> String {
    "houston_pediatric".into()
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            default_clinic_id: default_clinic_id(),
            default_pediatric_clinic_id: default_pediatric_clinic_id(),
        }
    }
}

impl ClinicConfig {
    /// Clinic used when an admin request does not name one.
    pub fn default_for(&self, kind: FormKind) -> &str {
        match kind {
            FormKind::Standard => &self.default_clinic_id,
            FormKind::Pediatric => &self.default_pediatric_clinic_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "intake.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., INTAKE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("INTAKE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
