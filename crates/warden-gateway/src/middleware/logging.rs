//! HTTP request/response logging
//!
//! One entry and one exit line per request at INFO, bodies at DEBUG.

use axum::{body::Body, extract::Request, http::StatusCode, middleware::Next, response::Response};
use http_body_util::BodyExt;
use tracing::{debug, warn, Instrument};

use super::trace_context::{RequestSpan, TraceContext};

/// Bodies larger than this are summarized by size
const MAX_BODY_LOG_SIZE: usize = 64 * 1024;

/// Response bodies are only logged below this size
const MAX_RESPONSE_LOG_SIZE: usize = 1000;

/// Paths whose bodies carry credentials
const SENSITIVE_PATHS: &[&str] = &["/api/v1/config"];

/// Static assets, never worth logging
const SKIP_BODY_PATHS: &[&str] = &["/ui", "/public"];

pub fn is_sensitive_path(path: &str) -> bool {
    SENSITIVE_PATHS.iter().any(|p| path.starts_with(p))
}

fn should_skip_body(path: &str) -> bool {
    SKIP_BODY_PATHS.iter().any(|p| path.starts_with(p))
}

pub fn format_body(bytes: &[u8], redact: bool) -> String {
    if redact {
        return "[REDACTED]".to_string();
    }
    if bytes.is_empty() {
        return "[empty]".to_string();
    }
    if bytes.len() > MAX_BODY_LOG_SIZE {
        return format!("[{} bytes]", bytes.len());
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(json) => serde_json::to_string(&json).unwrap_or_else(|_| text.to_string()),
            Err(_) if text.len() > 200 => {
                let cut = (0..=200).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
                format!("{}...", &text[..cut])
            }
            Err(_) => text.to_string(),
        },
        Err(_) => format!("[binary: {} bytes]", bytes.len()),
    }
}

pub async fn http_logging_middleware(request: Request, next: Next) -> Result<Response, StatusCode> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let redact = is_sensitive_path(&path);
    let skip_body = should_skip_body(&path);

    let ctx = TraceContext::new(&method, &path);
    let span = RequestSpan::enter(&ctx);

    async move {
        RequestSpan::log_entry(&ctx);

        let (mut parts, body) = request.into_parts();
        parts.extensions.insert(ctx.clone());

        let request = if skip_body {
            Request::from_parts(parts, body)
        } else {
            let bytes = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    warn!(trace_id = %ctx.trace_id, "Failed to read request body: {}", e);
                    return Err(StatusCode::BAD_REQUEST);
                }
            };
            if !bytes.is_empty() {
                debug!(
                    trace_id = %ctx.trace_id,
                    body = %format_body(&bytes, redact),
                    "Request body"
                );
            }
            Request::from_parts(parts, Body::from(bytes))
        };

        let response = next.run(request).await;
        let status = response.status();

        if skip_body {
            RequestSpan::log_exit(&ctx, status.as_u16());
            return Ok(response);
        }

        let (parts, body) = response.into_parts();
        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(trace_id = %ctx.trace_id, "Failed to read response body: {}", e);
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        if !bytes.is_empty() && bytes.len() < MAX_RESPONSE_LOG_SIZE {
            debug!(
                trace_id = %ctx.trace_id,
                body = %format_body(&bytes, redact),
                "Response body"
            );
        }

        RequestSpan::log_exit(&ctx, status.as_u16());
        Ok(Response::from_parts(parts, Body::from(bytes)))
    }
    .instrument(span)
    .await
}
