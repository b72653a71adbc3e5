//! Web console routes
//!
//! - `/ui/*`, `/public/*` - static assets from `console.assets_dir`, falling
//!   back to `index.html` so client-side routes resolve. Without an assets
//!   directory both answer 404.
//! - `GET|POST /api/v1/config` - service URLs and keys the UI needs
//! - `GET /api/v1/authorizers` - authorizer instances the UI can talk to

use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, warn};
use warden_core::{services, Config, RegistrationError};

use crate::http_error::ApiError;
use crate::registry::GatewayMux;

/// Settings served to the console UI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorizer_service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorizer_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reader_service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer_service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importer_service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exporter_service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_tenant_id: Option<String>,
}

impl ConsoleSettings {
    pub fn from_config(config: &Config) -> Self {
        let url = |name: &str| {
            config
                .service(name)
                .filter(|def| def.gateway.is_enabled())
                .map(|def| def.gateway.base_url())
        };

        Self {
            authorizer_service_url: url(services::AUTHORIZER),
            // Opt-in: this route is public, so a shared key is readable by anyone
            authorizer_api_key: config
                .console
                .share_api_key
                .then(|| config.auth.api_keys.keys().next().cloned())
                .flatten(),
            reader_service_url: url(services::READER),
            writer_service_url: url(services::WRITER),
            importer_service_url: url(services::IMPORTER),
            exporter_service_url: url(services::EXPORTER),
            model_service_url: url(services::MODEL),
            console_url: url(services::CONSOLE),
            directory_api_key: config.directory_resolver.api_key.clone(),
            directory_tenant_id: config.directory_resolver.tenant_id.clone(),
        }
    }
}

/// An authorizer instance listed by the console
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizerInstance {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizersResponse {
    pub results: Vec<AuthorizerInstance>,
}

impl AuthorizersResponse {
    pub fn from_config(config: &Config) -> Self {
        let results = config
            .service(services::AUTHORIZER)
            .filter(|def| def.gateway.is_enabled())
            .map(|def| AuthorizerInstance {
                name: services::AUTHORIZER.to_string(),
                url: def.gateway.base_url(),
            })
            .into_iter()
            .collect();
        Self { results }
    }
}

#[derive(Clone)]
struct ConsoleState {
    config: Arc<Config>,
}

/// Mount every console route on `mux`
pub fn mount(mux: &mut GatewayMux, config: Arc<Config>) -> Result<(), RegistrationError> {
    let assets = config.console.assets_dir.clone();
    if assets.as_os_str().is_empty() {
        warn!("[Console] console.assets_dir is not set, UI assets are not served");
        mux.nest_service(services::CONSOLE, "/ui", get(assets_unavailable))?;
        mux.nest_service(services::CONSOLE, "/public", get(assets_unavailable))?;
    } else {
        let index = assets.join("index.html");
        mux.nest_service(
            services::CONSOLE,
            "/ui",
            ServeDir::new(&assets).fallback(ServeFile::new(&index)),
        )?;
        mux.nest_service(
            services::CONSOLE,
            "/public",
            ServeDir::new(assets.join("public")).fallback(ServeFile::new(&index)),
        )?;
        debug!("[Console] Serving assets from {}", assets.display());
    }

    if config.console.share_api_key && !config.auth.api_keys.is_empty() {
        warn!(
            "[Console] console.share_api_key is set, /api/v1/config exposes an API key \
             without authentication"
        );
    }

    let state = ConsoleState { config };
    mux.route(
        services::CONSOLE,
        "/api/v1/config",
        get(config_handler)
            .post(config_handler)
            .with_state(state.clone()),
    )?;
    mux.route(
        services::CONSOLE,
        "/api/v1/authorizers",
        get(authorizers_handler).with_state(state),
    )?;

    Ok(())
}

async fn assets_unavailable() -> ApiError {
    ApiError::not_found("console assets are not configured")
}

async fn config_handler(State(state): State<ConsoleState>) -> Json<ConsoleSettings> {
    Json(ConsoleSettings::from_config(&state.config))
}

async fn authorizers_handler(State(state): State<ConsoleState>) -> Json<AuthorizersResponse> {
    Json(AuthorizersResponse::from_config(&state.config))
}

/// Standalone router with just the console routes
pub fn router(config: Arc<Config>) -> Result<Router, RegistrationError> {
    let mut mux = GatewayMux::new();
    mount(&mut mux, config)?;
    Ok(mux.into_router())
}
