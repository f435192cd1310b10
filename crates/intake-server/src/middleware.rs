use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use intake_core::{FormKind, token::log_prefix};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id stored in request extensions for logging.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

// Ensures each request has an X-Request-Id and mirrors it on the response
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    // Preserve an incoming id; otherwise generate one
    let req_id_value = req
        .headers()
        .get(&header_name)
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    if let Some(value) = &req_id_value {
        let id = value.to_str().unwrap_or_default().to_string();
        req.extensions_mut().insert(RequestId(id));
    }

    let mut res = next.run(req).await;

    if let Some(value) = req_id_value {
        res.headers_mut().insert(header_name, value);
    }
    res
}

/// Request path with link tokens cut down to their log prefix.
pub fn loggable_path(path: &str) -> String {
    let mut out = Vec::new();
    let mut token_follows = false;
    for segment in path.split('/') {
        if token_follows && !segment.is_empty() {
            out.push(format!("{}...", log_prefix(segment)));
        } else {
            out.push(segment.to_string());
        }
        token_follows = FormKind::ALL
            .iter()
            .any(|k| segment == k.form_route() || segment == k.submit_route());
    }
    out.join("/")
}
