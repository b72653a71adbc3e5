//! Configuration
//!
//! The whole process is described by one JSON document. Every block except
//! `api.services` is optional.

mod decision_log;
mod service;

pub use decision_log::DecisionLogConfig;
pub use service::{
    CertsConfig, GatewayConfig, GrpcConfig, ServiceDefinition, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_READ_HEADER_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub edge: EdgeConfig,
    #[serde(default)]
    pub directory_resolver: DirectoryResolverConfig,
    #[serde(default)]
    pub decision_logger: DecisionLogConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
}

impl Config {
    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("[Config] Loading {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Definition of a configured service
    pub fn service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.api.services.get(name)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.api.services.contains_key(name)
    }
}

/// Network surface: health, metrics and the logical services
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default)]
    pub listen_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certs: Option<CertsConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub listen_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certs: Option<CertsConfig>,
    /// Expose the `/debug/*` diagnostics pages
    #[serde(default)]
    pub zpages: bool,
}

/// Embedded directory settings. An empty `db_path` disables the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeConfig {
    #[serde(default)]
    pub db_path: PathBuf,
    #[serde(default)]
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub max_concurrent_requests: u32,
}

impl EdgeConfig {
    pub fn is_enabled(&self) -> bool {
        !self.db_path.as_os_str().is_empty()
    }
}

/// Address the authorizer uses to reach the directory reader
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryResolverConfig {
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// API-key authentication. Empty `api_keys` disables it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// key -> identity
    #[serde(default)]
    pub api_keys: BTreeMap<String, String>,
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Directory holding the built web UI
    #[serde(default)]
    pub assets_dir: PathBuf,
    /// Hand the first `auth.api_keys` key to the console through the
    /// unauthenticated `/api/v1/config` route. Anyone who can reach the
    /// gateway can then read it.
    #[serde(default)]
    pub share_api_key: bool,
}
