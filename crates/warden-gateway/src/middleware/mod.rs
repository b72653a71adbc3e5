//! Middleware chains for composed servers
//!
//! A chain is an ordered list of router transformers. They are applied in
//! order when a composed server starts, so the last entry ends up outermost.

mod auth;
mod logging;
mod trace_context;

pub use auth::{api_key_auth, presented_key, ApiKeys, Identity};
pub use logging::{format_body, http_logging_middleware, is_sensitive_path};
pub use trace_context::{generate_trace_id, RequestSpan, TraceContext};

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use warden_core::{Config, EndpointGroup};

/// Wraps a router in one more layer
pub type Middleware = Arc<dyn Fn(Router) -> Router + Send + Sync>;

/// Apply `chain` to `router`, first entry innermost
pub fn apply(router: Router, chain: &[Middleware]) -> Router {
    chain.iter().fold(router, |router, layer| layer(router))
}

/// Middleware shared by every service on an endpoint
pub fn for_services(config: &Config, group: &EndpointGroup) -> Vec<Middleware> {
    let mut chain: Vec<Middleware> = Vec::new();

    if config.auth.is_enabled() {
        let keys = ApiKeys::new(config.auth.api_keys.clone());
        debug!(
            "[Middleware] API-key auth on {} ({} key(s))",
            group.address,
            keys.len()
        );
        chain.push(Arc::new(move |router: Router| {
            router.layer(middleware::from_fn_with_state(keys.clone(), api_key_auth))
        }));
    }

    if let Some(cors) = cors_layer(&group.api.gateway.allowed_origins) {
        chain.push(Arc::new(move |router: Router| router.layer(cors.clone())));
    }

    chain.push(Arc::new(|router: Router| {
        router.layer(middleware::from_fn(http_logging_middleware))
    }));
    chain.push(Arc::new(|router: Router| router.layer(TraceLayer::new_for_http())));

    chain
}

/// CORS from the gateway's allowed origins, `*` allows any
pub fn cors_layer(allowed_origins: &[String]) -> Option<CorsLayer> {
    if allowed_origins.is_empty() {
        return None;
    }

    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    if allowed_origins.iter().any(|o| o == "*") {
        return Some(base.allow_origin(Any));
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("[Middleware] Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    Some(base.allow_origin(origins))
}
