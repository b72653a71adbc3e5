//! Orchestrator
//!
//! Drives one configuration pass and the process lifecycle:
//!
//! 1. health and metrics servers are set up on the manager
//! 2. the registry is prepared from configuration and injected collaborators
//! 3. services are grouped by endpoint and the dependency map is built
//! 4. every group is composed and added to the manager
//! 5. the topology is validated
//!
//! `start` then binds servers in dependency order and publishes SERVING for
//! each configured service; `shutdown` stops everything and flushes the
//! decision logger.

use std::sync::Arc;

use tracing::{info, warn};
use warden_core::{
    select_decision_logger, services, Config, DecisionLogger, Error, Result, Topology,
};

use crate::composer;
use crate::dependencies::{
    OrchestratorDependencies, AUTHORIZER_KEY, CONSOLE_KEY, DIRECTORY_KEY,
};
use crate::manager::{ServiceManager, ServingStatus, OVERALL};
use crate::middleware::Middleware;
use crate::registry::{AuthorizerService, ConsoleService, DirectoryService, ServiceRegistry};
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    New,
    Configured,
    Running,
    Stopped,
}

pub struct Orchestrator {
    config: Arc<Config>,
    deps: OrchestratorDependencies,
    decision_logger: Arc<dyn DecisionLogger>,
    registry: ServiceRegistry,
    topology: Topology,
    manager: ServiceManager,
    phase: Phase,
}

impl Orchestrator {
    /// Select the decision logger and prepare an empty manager.
    ///
    /// A logger injected through the dependencies takes precedence over the
    /// `decision_logger` config block.
    pub async fn new(config: Config, deps: OrchestratorDependencies) -> Result<Self> {
        let decision_logger = match deps.decision_logger.clone() {
            Some(logger) => {
                info!("[Orchestrator] Using injected '{}' decision logger", logger.kind());
                logger
            }
            None => select_decision_logger(&config.decision_logger, &deps.cancel).await?,
        };

        let manager = ServiceManager::new(deps.cancel.child_token());

        Ok(Self {
            config: Arc::new(config),
            deps,
            decision_logger,
            registry: ServiceRegistry::new(),
            topology: Topology::default(),
            manager,
            phase: Phase::New,
        })
    }

    /// Compose every configured service onto the manager. Nothing is bound yet.
    pub async fn config_services(&mut self) -> Result<()> {
        if self.phase != Phase::New {
            return Err(Error::startup("services are already configured"));
        }

        let shared = self.setup_aux_servers()?;
        self.prepare_registry().await?;

        self.topology = Topology::build(&self.config.api);
        composer::compose(
            &self.config,
            &self.topology,
            &self.registry,
            &shared,
            &mut self.manager,
        )?;

        validation::validate(&self.config, &self.registry)?;

        self.phase = Phase::Configured;
        info!("[Orchestrator] Services configured");
        Ok(())
    }

    fn setup_aux_servers(&mut self) -> Result<Vec<Middleware>> {
        let api = &self.config.api;

        if !api.health.listen_address.is_empty() {
            self.manager
                .setup_health_server(&api.health.listen_address, api.health.certs.as_ref())?;
        }

        if api.metrics.listen_address.is_empty() {
            return Ok(Vec::new());
        }
        self.manager.setup_metrics_server(
            &api.metrics.listen_address,
            api.metrics.certs.as_ref(),
            api.metrics.zpages,
        )
    }

    /// Register providers in order: directory, authorizer, console, extras
    async fn prepare_registry(&mut self) -> Result<()> {
        let config = &self.config;

        if config.edge.is_enabled() {
            let provider = self.deps.directory_provider.as_ref().ok_or_else(|| {
                Error::configuration("edge.db_path is set but no directory provider was supplied")
            })?;
            let store = provider.open(&config.edge).await.map_err(|e| {
                Error::configuration(format!(
                    "failed to open directory at {}: {:#}",
                    config.edge.db_path.display(),
                    e
                ))
            })?;
            self.registry
                .register(DIRECTORY_KEY, Arc::new(DirectoryService::new(store)));
        }

        if config.has_service(services::AUTHORIZER) {
            let engine = self.deps.policy_engine.clone().ok_or_else(|| {
                Error::configuration("authorizer is configured but no policy engine was supplied")
            })?;
            self.registry.register(
                AUTHORIZER_KEY,
                Arc::new(AuthorizerService::new(engine, self.decision_logger.clone())),
            );
        }

        if config.has_service(services::CONSOLE) {
            self.registry
                .register(CONSOLE_KEY, Arc::new(ConsoleService::new()));
        }

        for (key, provider) in &self.deps.extra_services {
            self.registry.register(key, provider.clone());
        }

        info!("[Orchestrator] {} provider(s) registered", self.registry.len());
        Ok(())
    }

    /// Bind and serve every composed server, then publish health.
    ///
    /// On failure no status is published and already started servers are
    /// stopped again.
    pub async fn start(&mut self) -> Result<()> {
        match self.phase {
            Phase::Configured => {}
            Phase::New => return Err(Error::startup("services are not configured")),
            Phase::Running | Phase::Stopped => {
                return Err(Error::startup("orchestrator was already started"))
            }
        }

        self.phase = Phase::Stopped;
        self.manager.start_servers(&self.topology.dependencies).await?;

        for name in self.config.api.services.keys() {
            self.manager.set_service_status(name, ServingStatus::Serving);
        }
        self.manager.set_service_status(OVERALL, ServingStatus::Serving);
        self.phase = Phase::Running;

        info!("[Orchestrator] Started");
        Ok(())
    }

    /// Stop every server, run cleanups and flush the decision logger
    pub async fn shutdown(&mut self) {
        if self.phase == Phase::New {
            warn!("[Orchestrator] Shutdown before configuration");
        }
        self.manager.shutdown().await;
        self.decision_logger.shutdown().await;
        self.phase = Phase::Stopped;
        info!("[Orchestrator] Stopped");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn manager(&self) -> &ServiceManager {
        &self.manager
    }

    pub fn decision_logger(&self) -> &Arc<dyn DecisionLogger> {
        &self.decision_logger
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }
}
