//! Per-service endpoint configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default gateway read timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);
/// Default gateway read-header timeout
pub const DEFAULT_READ_HEADER_TIMEOUT: Duration = Duration::from_secs(2);
/// Default gateway write timeout
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);
/// Default gateway idle timeout
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// One logical service bound to a protocol endpoint and a gateway endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub grpc: GrpcConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Services that must be accepting connections before this one starts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,
}

impl ServiceDefinition {
    /// Protocol listen address, the key services are grouped by
    pub fn endpoint(&self) -> &str {
        &self.grpc.listen_address
    }
}

/// Transport credentials. Loading them is left to the TLS layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertsConfig {
    pub tls_key_path: PathBuf,
    pub tls_cert_path: PathBuf,
    #[serde(default)]
    pub tls_ca_cert_path: Option<PathBuf>,
}

/// Protocol (native API) listener
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcConfig {
    pub listen_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certs: Option<CertsConfig>,
    #[serde(default)]
    pub connection_timeout_seconds: u64,
}

/// REST gateway listener and its HTTP timeouts.
///
/// A zero timeout means "unset" and is replaced by the defaults when the
/// service is grouped onto an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub listen_address: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_origins: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certs: Option<CertsConfig>,
    /// Serve plain HTTP even when certs are present
    #[serde(default)]
    pub http: bool,
    #[serde(default, with = "seconds")]
    pub read_timeout: Duration,
    #[serde(default, with = "seconds")]
    pub read_header_timeout: Duration,
    #[serde(default, with = "seconds")]
    pub write_timeout: Duration,
    #[serde(default, with = "seconds")]
    pub idle_timeout: Duration,
}

impl GatewayConfig {
    /// Fill every unset timeout with its default
    pub fn apply_default_timeouts(&mut self) {
        if self.read_timeout.is_zero() {
            self.read_timeout = DEFAULT_READ_TIMEOUT;
        }
        if self.read_header_timeout.is_zero() {
            self.read_header_timeout = DEFAULT_READ_HEADER_TIMEOUT;
        }
        if self.write_timeout.is_zero() {
            self.write_timeout = DEFAULT_WRITE_TIMEOUT;
        }
        if self.idle_timeout.is_zero() {
            self.idle_timeout = DEFAULT_IDLE_TIMEOUT;
        }
    }

    /// Whether a gateway listener should be started at all
    pub fn is_enabled(&self) -> bool {
        !self.listen_address.is_empty()
    }

    /// Base URL clients use to reach this gateway
    pub fn base_url(&self) -> String {
        let scheme = if self.certs.is_some() && !self.http {
            "https"
        } else {
            "http"
        };
        let address = self
            .listen_address
            .strip_prefix("0.0.0.0")
            .map(|port| format!("localhost{}", port))
            .unwrap_or_else(|| self.listen_address.clone());
        format!("{}://{}", scheme, address)
    }
}

/// (De)serialize a `Duration` as whole seconds
mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
