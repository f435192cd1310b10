pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;

pub use config::{AppConfig, ClinicConfig, SecurityConfig, ServerConfig, SmsConfig, WebhookConfig};
pub use error::ApiError;
pub use observability::{apply_logging_level, init_tracing};
pub use server::{AppState, IntakeServer, ServerBuilder, build_app, build_router};
