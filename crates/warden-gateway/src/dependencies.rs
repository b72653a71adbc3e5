//! Dependency container
//!
//! Collaborators the orchestrator cannot build from configuration alone are
//! injected here: the policy engine, the directory provider and any extra
//! capability providers. Everything is optional; a missing collaborator only
//! fails start when the configuration asks for it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use warden_core::{DecisionLogger, DirectoryProvider, PolicyEngine};

use crate::registry::ServiceProvider;

/// Registry keys of the built-in providers
pub const DIRECTORY_KEY: &str = "directory";
pub const AUTHORIZER_KEY: &str = "authorizer";
pub const CONSOLE_KEY: &str = "console";

const RESERVED_KEYS: [&str; 3] = [DIRECTORY_KEY, AUTHORIZER_KEY, CONSOLE_KEY];

#[derive(Clone)]
pub struct OrchestratorDependencies {
    pub policy_engine: Option<Arc<dyn PolicyEngine>>,
    pub directory_provider: Option<Arc<dyn DirectoryProvider>>,
    /// Replaces the logger selected from `decision_logger`
    pub decision_logger: Option<Arc<dyn DecisionLogger>>,
    /// Registered after the built-in providers, in order
    pub extra_services: Vec<(String, Arc<dyn ServiceProvider>)>,
    /// Parent token; cancelling it stops every server
    pub cancel: CancellationToken,
}

impl Default for OrchestratorDependencies {
    fn default() -> Self {
        Self {
            policy_engine: None,
            directory_provider: None,
            decision_logger: None,
            extra_services: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Builder for OrchestratorDependencies
#[derive(Default)]
pub struct DependenciesBuilder {
    policy_engine: Option<Arc<dyn PolicyEngine>>,
    directory_provider: Option<Arc<dyn DirectoryProvider>>,
    decision_logger: Option<Arc<dyn DecisionLogger>>,
    extra_services: Vec<(String, Arc<dyn ServiceProvider>)>,
    cancel: Option<CancellationToken>,
}

impl DependenciesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy_engine(mut self, engine: Arc<dyn PolicyEngine>) -> Self {
        self.policy_engine = Some(engine);
        self
    }

    pub fn with_directory_provider(mut self, provider: Arc<dyn DirectoryProvider>) -> Self {
        self.directory_provider = Some(provider);
        self
    }

    pub fn with_decision_logger(mut self, logger: Arc<dyn DecisionLogger>) -> Self {
        self.decision_logger = Some(logger);
        self
    }

    pub fn with_service(mut self, key: impl Into<String>, provider: Arc<dyn ServiceProvider>) -> Self {
        self.extra_services.push((key.into(), provider));
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Result<OrchestratorDependencies, String> {
        for (index, (key, _)) in self.extra_services.iter().enumerate() {
            if RESERVED_KEYS.contains(&key.as_str()) {
                return Err(format!("service key '{}' is reserved", key));
            }
            if self.extra_services[..index].iter().any(|(k, _)| k == key) {
                return Err(format!("service key '{}' is registered twice", key));
            }
        }

        Ok(OrchestratorDependencies {
            policy_engine: self.policy_engine,
            directory_provider: self.directory_provider,
            decision_logger: self.decision_logger,
            extra_services: self.extra_services,
            cancel: self.cancel.unwrap_or_else(CancellationToken::new),
        })
    }
}
