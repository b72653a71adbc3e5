//! # Warden Core Library
//!
//! Configuration, topology planning and decision logging for the Warden
//! authorization server.
//!
//! ## Modules
//!
//! - `config` - Typed configuration loaded from the JSON config file
//! - `topology` - Endpoint grouping and inter-endpoint dependency graph
//! - `decision_log` - Pluggable decision-log backends and their selector
//! - `collaborators` - Traits for the policy engine and directory store
//! - `error` - Error taxonomy shared by every Warden crate

pub mod collaborators;
pub mod config;
pub mod decision_log;
pub mod error;
pub mod topology;

pub use collaborators::{
    DecisionRequest, DecisionResponse, DirectoryProvider, DirectoryStore, PolicyEngine,
    PolicyInfo,
};
pub use config::{
    ApiConfig, AuthConfig, ConsoleConfig, Config, DecisionLogConfig, DirectoryResolverConfig,
    EdgeConfig, GatewayConfig, GrpcConfig, HealthConfig, MetricsConfig, ServiceDefinition,
};
pub use decision_log::{select_decision_logger, Decision, DecisionLogger};
pub use error::{Error, RegistrationError, Result};
pub use topology::{DependencyMap, EndpointGroup, Topology};

/// Well-known service names
pub mod services {
    pub const AUTHORIZER: &str = "authorizer";
    pub const READER: &str = "reader";
    pub const WRITER: &str = "writer";
    pub const EXPORTER: &str = "exporter";
    pub const IMPORTER: &str = "importer";
    pub const MODEL: &str = "model";
    pub const CONSOLE: &str = "console";
}
