//! API-key authentication
//!
//! Keys are read from `Authorization: basic <key>`, `Authorization: Bearer
//! <key>` or `x-api-key`. The matching identity is attached to the request
//! as an `Identity` extension.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::trace_context::TraceContext;
use crate::http_error::ApiError;

/// Console assets stay reachable without a key
const PUBLIC_PREFIXES: &[&str] = &["/ui", "/public"];

/// Console bootstrap routes, reachable without a key. `/api/v1/config` hands
/// out an API key only when `console.share_api_key` is set.
const PUBLIC_PATHS: &[&str] = &["/api/v1/config", "/api/v1/authorizers"];

/// Caller identity resolved from an API key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

/// key -> identity
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    keys: Arc<BTreeMap<String, String>>,
}

impl ApiKeys {
    pub fn new(keys: BTreeMap<String, String>) -> Self {
        Self {
            keys: Arc::new(keys),
        }
    }

    pub fn identity(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || PUBLIC_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Extract the presented key, if any
pub fn presented_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        let mut parts = value.splitn(2, ' ');
        let scheme = parts.next().unwrap_or_default();
        let key = parts.next().unwrap_or_default().trim();
        if (scheme.eq_ignore_ascii_case("basic") || scheme.eq_ignore_ascii_case("bearer"))
            && !key.is_empty()
        {
            return Some(key.to_string());
        }
    }

    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn api_key_auth(State(keys): State<ApiKeys>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if is_public(&path) {
        return next.run(request).await;
    }

    let trace_id = request
        .extensions()
        .get::<TraceContext>()
        .map(|ctx| ctx.trace_id.clone())
        .unwrap_or_default();

    let Some(key) = presented_key(request.headers()) else {
        debug!(trace_id = %trace_id, "[Auth] No API key on {}", path);
        return ApiError::unauthorized("missing API key").into_response();
    };

    match keys.identity(&key) {
        Some(identity) => {
            debug!(trace_id = %trace_id, "[Auth] Authenticated {}", identity);
            request
                .extensions_mut()
                .insert(Identity(identity.to_string()));
            next.run(request).await
        }
        None => {
            warn!(trace_id = %trace_id, "[Auth] Rejected unknown API key on {}", path);
            ApiError::unauthorized("invalid API key").into_response()
        }
    }
}
