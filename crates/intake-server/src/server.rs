use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use intake_core::{LinkIssuer, SubmissionPipeline, TokenCodec, generate_secret};
use intake_notifications::{SmsChannel, SmsGate, WebhookDispatcher, WebhookTarget};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, ClinicConfig};
use crate::middleware::{self as app_middleware, RequestId, loggable_path};
use crate::handlers;

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub issuer: LinkIssuer,
    pub pipeline: SubmissionPipeline,
    /// Present only when SMS is fully configured.
    pub sms: Option<SmsChannel>,
    pub webhook_configured: bool,
    pub base_url: Option<String>,
    pub fallback_base_url: String,
    pub clinic: ClinicConfig,
}

impl AppState {
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let secret = match cfg.security.secret_key.as_deref() {
            Some(secret) => secret.to_string(),
            None => {
                tracing::warn!(
                    "security.secret_key not set; generated a random key, issued links will not survive a restart"
                );
                generate_secret()
            }
        };
        let codec = Arc::new(
            TokenCodec::new(secret)
                .context("invalid token secret")?
                .with_ttl(cfg.token_ttl()),
        );

        let target = match cfg.webhook.endpoint() {
            Some(url) => {
                let mut target = WebhookTarget::new(url).context("webhook.url")?;
                if let Some(secret) = cfg.webhook.signing_secret() {
                    target = target.with_secret(secret).context("webhook.secret")?;
                }
                for (name, value) in &cfg.webhook.headers {
                    target = target.with_header(name, value).context("webhook.headers")?;
                }
                tracing::info!(url = %target.url(), "Webhook dispatch enabled");
                Some(target)
            }
            None => {
                tracing::warn!("webhook.url not set; submissions will be accepted but not forwarded");
                None
            }
        };
        let dispatcher = WebhookDispatcher::new(target, cfg.webhook_timeout())
            .context("failed to build webhook client")?;
        let webhook_configured = dispatcher.is_configured();

        let sms = SmsGate::from_config(&cfg.sms_settings());

        Ok(Self {
            issuer: LinkIssuer::new(codec.clone()),
            pipeline: SubmissionPipeline::new(codec, Arc::new(dispatcher)),
            sms,
            webhook_configured,
            base_url: cfg.base_url().map(|b| b.trim_end_matches('/').to_string()),
            fallback_base_url: cfg.fallback_base_url(),
            clinic: cfg.clinic.clone(),
        })
    }
}

pub fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let state = AppState::from_config(cfg)?;
    Ok(build_router(state, cfg.server.body_limit_bytes))
}

pub fn build_router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        // Patient-facing form routes
        .route("/intake/{token}", get(handlers::intake_form))
        .route("/pediatric-intake/{token}", get(handlers::pediatric_intake_form))
        .route("/submit/{token}", post(handlers::submit_intake))
        .route("/pediatric-submit/{token}", post(handlers::submit_pediatric_intake))
        // Admin routes
        .route("/admin/generate-link", post(handlers::generate_link))
        .route(
            "/admin/generate-pediatric-link",
            post(handlers::generate_pediatric_link),
        )
        .route("/admin/send-intake-link", post(handlers::send_intake_link))
        .route("/admin/sms-status", get(handlers::sms_status))
        .fallback(handlers::not_found)
        .with_state(state)
        // Request id is outermost so the trace span can read it
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(app_middleware::request_id))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &axum::http::Request<_>| {
                            use tracing::field::Empty;
                            let req_id = req
                                .extensions()
                                .get::<RequestId>()
                                .map(|id| id.0.as_str())
                                .unwrap_or("");
                            tracing::info_span!(
                                "http.request",
                                http.method = %req.method(),
                                http.target = %loggable_path(req.uri().path()),
                                http.status_code = Empty,
                                request_id = %req_id
                            )
                        })
                        .on_response(
                            |res: &axum::http::Response<_>,
                             latency: std::time::Duration,
                             span: &tracing::Span| {
                                span.record(
                                    "http.status_code",
                                    tracing::field::display(res.status().as_u16()),
                                );
                                tracing::info!(
                                    http.status = %res.status().as_u16(),
                                    elapsed_ms = %latency.as_millis(),
                                    "request handled"
                                );
                            },
                        ),
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct IntakeServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> anyhow::Result<IntakeServer> {
        let app = build_app(&self.config)?;
        Ok(IntakeServer {
            addr: self.addr,
            app,
        })
    }
}

impl IntakeServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
