//! Service Registry
//!
//! Each subsystem (authorizer, directory, console) is wrapped in a
//! `ServiceProvider` that advertises the capability names it serves and
//! hands out route-attachment closures for the protocol listener and the
//! REST gateway. The registry keeps providers in registration order; when
//! two providers claim the same capability the first one wins.

mod authorizer;
mod console;
mod directory;

pub use authorizer::AuthorizerService;
pub use console::ConsoleService;
pub use directory::DirectoryService;

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::routing::MethodRouter;
use axum::Router;
use tower::Service;
use tracing::{debug, warn};
use warden_core::config::GatewayConfig;
use warden_core::RegistrationError;

/// Attaches a service's handlers to the protocol listener
pub type ProtocolRegistration = Box<dyn Fn(&mut ProtocolServer) + Send + Sync>;

/// Attaches a service's REST handlers to the gateway mux
pub type GatewayRegistration =
    Box<dyn Fn(&mut GatewayMux, &GatewayContext) -> Result<(), RegistrationError> + Send + Sync>;

/// Zero-argument teardown action run at shutdown
pub type Cleanup = Arc<dyn Fn() + Send + Sync>;

/// Capability provider wrapping one subsystem
pub trait ServiceProvider: Send + Sync {
    /// Subsystem name used in logs
    fn name(&self) -> &'static str;

    /// Capability names this provider can serve
    fn available_services(&self) -> Vec<&'static str>;

    /// Protocol handlers for the subset of `services` this provider owns
    fn protocol_registrations(&self, services: &[String]) -> ProtocolRegistration;

    /// Gateway handlers for the subset of `services` this provider owns
    fn gateway_registration(&self, services: &[String]) -> GatewayRegistration;

    fn cleanups(&self) -> Vec<Cleanup>;
}

/// Context handed to gateway registrations
#[derive(Debug, Clone)]
pub struct GatewayContext {
    /// Protocol listen address of the composed server
    pub protocol_address: String,
    /// Effective gateway settings of the composed server
    pub gateway: GatewayConfig,
}

/// Route table of the protocol (native API) listener
#[derive(Default)]
pub struct ProtocolServer {
    router: Router,
    routes: BTreeSet<String>,
    services: Vec<String>,
}

impl ProtocolServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a service name served by this listener (used for introspection)
    pub fn register_service(&mut self, name: &str) {
        if !self.services.iter().any(|s| s == name) {
            self.services.push(name.to_string());
        }
    }

    /// Add a route. Repeated paths are ignored with a warning.
    pub fn route(&mut self, path: &str, handler: MethodRouter) -> &mut Self {
        if !self.routes.insert(path.to_string()) {
            warn!("[Registry] Protocol route {} registered twice, keeping the first", path);
            return self;
        }
        let router = std::mem::take(&mut self.router);
        self.router = router.route(path, handler);
        self
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(String::as_str)
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

/// REST gateway multiplexer
#[derive(Debug, Default)]
pub struct GatewayMux {
    router: Router,
    routes: BTreeSet<String>,
}

impl GatewayMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route; a path that is already mounted is a registration error
    pub fn route(
        &mut self,
        owner: &str,
        path: &str,
        handler: MethodRouter,
    ) -> Result<&mut Self, RegistrationError> {
        self.claim(owner, path)?;
        let router = std::mem::take(&mut self.router);
        self.router = router.route(path, handler);
        Ok(self)
    }

    /// Mount a tower service under a path prefix (e.g. static assets)
    pub fn nest_service<S>(
        &mut self,
        owner: &str,
        prefix: &str,
        service: S,
    ) -> Result<&mut Self, RegistrationError>
    where
        S: Service<axum::extract::Request, Error = std::convert::Infallible>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Response: axum::response::IntoResponse,
        S::Future: Send + 'static,
    {
        self.claim(owner, prefix)?;
        let router = std::mem::take(&mut self.router);
        self.router = router.nest_service(prefix, service);
        Ok(self)
    }

    pub fn has_route(&self, path: &str) -> bool {
        self.routes.contains(path)
    }

    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    fn claim(&mut self, owner: &str, path: &str) -> Result<(), RegistrationError> {
        if !self.routes.insert(path.to_string()) {
            return Err(RegistrationError::new(
                owner,
                format!("route {} is already mounted", path),
            ));
        }
        Ok(())
    }
}

struct RegisteredService {
    key: String,
    provider: Arc<dyn ServiceProvider>,
}

/// Ordered set of capability providers
#[derive(Default)]
pub struct ServiceRegistry {
    services: Vec<RegisteredService>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under `key`. A key that is already taken keeps its
    /// first provider.
    pub fn register(&mut self, key: &str, provider: Arc<dyn ServiceProvider>) {
        if self.services.iter().any(|s| s.key == key) {
            warn!("[Registry] '{}' already registered, ignoring the new provider", key);
            return;
        }
        for capability in provider.available_services() {
            if let Some(owner) = self.owner_of(capability) {
                debug!(
                    "[Registry] '{}' also claims '{}', first owner '{}' wins",
                    key, capability, owner
                );
            }
        }
        debug!(
            "[Registry] Registered '{}' ({})",
            key,
            provider.available_services().join(", ")
        );
        self.services.push(RegisteredService {
            key: key.to_string(),
            provider,
        });
    }

    /// Providers in registration order
    pub fn providers(&self) -> impl Iterator<Item = (&str, &Arc<dyn ServiceProvider>)> {
        self.services.iter().map(|s| (s.key.as_str(), &s.provider))
    }

    /// Key of the first provider advertising `capability`
    pub fn owner_of(&self, capability: &str) -> Option<&str> {
        self.services
            .iter()
            .find(|s| s.provider.available_services().contains(&capability))
            .map(|s| s.key.as_str())
    }

    pub fn advertises(&self, capability: &str) -> bool {
        self.owner_of(capability).is_some()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// `names` restricted to the capabilities `provider` advertises
pub(crate) fn owned_services(available: &[&'static str], names: &[String]) -> Vec<&'static str> {
    available
        .iter()
        .copied()
        .filter(|capability| names.iter().any(|n| n == capability))
        .collect()
}
