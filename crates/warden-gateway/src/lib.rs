//! Warden Gateway
//!
//! Composition and lifecycle layer of the Warden server:
//! - Capability providers (authorizer, directory, console) behind one registry
//! - One composed server per endpoint group, protocol listener plus REST gateway
//! - Shared middleware (API-key auth, CORS, request logging, metrics)
//! - Dependency-ordered startup with health and metrics servers
//! - Dependency injection of the policy engine and directory store

pub mod composer;
pub mod console;
pub mod dependencies;
pub mod http_error;
pub mod manager;
pub mod middleware;
pub mod orchestrator;
pub mod registry;
pub mod validation;

pub use composer::{compose, ServerDescriptor};
pub use dependencies::{DependenciesBuilder, OrchestratorDependencies};
pub use http_error::ApiError;
pub use manager::{
    plan_waves, ComposedServer, HealthReporter, RequestMetrics, ServerInfo, ServiceManager,
    ServingStatus,
};
pub use orchestrator::Orchestrator;
pub use registry::{
    AuthorizerService, Cleanup, ConsoleService, DirectoryService, GatewayContext, GatewayMux,
    GatewayRegistration, ProtocolRegistration, ProtocolServer, ServiceProvider, ServiceRegistry,
};
pub use validation::validate;
