//! Mock collaborators for testing
//!
//! In-memory policy engine, directory store and capability providers that
//! record how they were called.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::routing::post;
use parking_lot::Mutex;
use serde_json::{json, Value};

use warden_core::{
    Decision, DecisionLogger, DecisionRequest, DecisionResponse, DirectoryProvider,
    DirectoryStore, EdgeConfig, PolicyEngine, PolicyInfo,
};
use warden_gateway::{
    Cleanup, GatewayContext, GatewayMux, GatewayRegistration, ProtocolRegistration,
    ProtocolServer, ServiceProvider,
};

// ============================================================================
// MockPolicyEngine
// ============================================================================

/// Allows every decision unless the policy path is in the deny list
#[derive(Default)]
pub struct MockPolicyEngine {
    denied: Vec<String>,
    requests: Mutex<Vec<DecisionRequest>>,
    closed: AtomicBool,
}

impl MockPolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(mut self, policy_path: &str) -> Self {
        self.denied.push(policy_path.to_string());
        self
    }

    pub fn requests(&self) -> Vec<DecisionRequest> {
        self.requests.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyEngine for MockPolicyEngine {
    async fn decide(&self, request: &DecisionRequest) -> anyhow::Result<DecisionResponse> {
        self.requests.lock().push(request.clone());
        let allowed = !self.denied.contains(&request.policy_path);
        let mut response = DecisionResponse::default();
        for name in &request.decisions {
            response.decisions.insert(name.clone(), allowed);
        }
        Ok(response)
    }

    async fn info(&self) -> anyhow::Result<PolicyInfo> {
        Ok(PolicyInfo {
            name: "mock".to_string(),
            version: "0.0.1".to_string(),
            policies: vec!["todo".to_string()],
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// MockDirectoryStore / MockDirectoryProvider
// ============================================================================

/// Echoes every call back as JSON
#[derive(Default)]
pub struct MockDirectoryStore {
    calls: Mutex<Vec<(String, String)>>,
    closed: AtomicBool,
}

impl MockDirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryStore for MockDirectoryStore {
    async fn call(&self, capability: &str, method: &str, request: Value) -> anyhow::Result<Value> {
        self.calls
            .lock()
            .push((capability.to_string(), method.to_string()));
        Ok(json!({ "capability": capability, "method": method, "request": request }))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct MockDirectoryProvider {
    store: Arc<MockDirectoryStore>,
    fail: bool,
    opened: AtomicUsize,
}

impl MockDirectoryProvider {
    pub fn new(store: Arc<MockDirectoryStore>) -> Self {
        Self {
            store,
            fail: false,
            opened: AtomicUsize::new(0),
        }
    }

    /// A provider whose `open` always fails
    pub fn failing() -> Self {
        Self {
            store: Arc::new(MockDirectoryStore::new()),
            fail: true,
            opened: AtomicUsize::new(0),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryProvider for MockDirectoryProvider {
    async fn open(&self, config: &EdgeConfig) -> anyhow::Result<Arc<dyn DirectoryStore>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("cannot open {}", config.db_path.display());
        }
        let store: Arc<dyn DirectoryStore> = self.store.clone();
        Ok(store)
    }
}

// ============================================================================
// RecordingDecisionLogger
// ============================================================================

#[derive(Default)]
pub struct RecordingDecisionLogger {
    decisions: Mutex<Vec<Decision>>,
    shut_down: AtomicBool,
}

impl RecordingDecisionLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decisions(&self) -> Vec<Decision> {
        self.decisions.lock().clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionLogger for RecordingDecisionLogger {
    fn kind(&self) -> &'static str {
        "recording"
    }

    async fn log(&self, decision: &Decision) -> anyhow::Result<()> {
        self.decisions.lock().push(decision.clone());
        Ok(())
    }

    async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// CountingProvider
// ============================================================================

/// How often a `CountingProvider`'s registrations ran
#[derive(Debug, Default)]
pub struct Counters {
    pub protocol: AtomicUsize,
    pub gateway: AtomicUsize,
    pub cleanup: AtomicUsize,
}

impl Counters {
    pub fn protocol(&self) -> usize {
        self.protocol.load(Ordering::SeqCst)
    }

    pub fn gateway(&self) -> usize {
        self.gateway.load(Ordering::SeqCst)
    }

    pub fn cleanup(&self) -> usize {
        self.cleanup.load(Ordering::SeqCst)
    }
}

/// Provider that mounts `POST /{name}.test/ping` and `POST /api/test/{name}`
/// for each owned capability and counts every invocation
pub struct CountingProvider {
    capabilities: Vec<&'static str>,
    counters: Arc<Counters>,
}

impl CountingProvider {
    pub fn new(capabilities: &[&'static str]) -> (Arc<Self>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let provider = Arc::new(Self {
            capabilities: capabilities.to_vec(),
            counters: counters.clone(),
        });
        (provider, counters)
    }
}

impl ServiceProvider for CountingProvider {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn available_services(&self) -> Vec<&'static str> {
        self.capabilities.clone()
    }

    fn protocol_registrations(&self, names: &[String]) -> ProtocolRegistration {
        let counters = self.counters.clone();
        let names = names.to_vec();
        Box::new(move |server: &mut ProtocolServer| {
            counters.protocol.fetch_add(1, Ordering::SeqCst);
            for name in &names {
                server.register_service(name);
                let reply = name.clone();
                server.route(
                    &format!("/{}.test/ping", name),
                    post(move || {
                        let reply = reply.clone();
                        async move { reply }
                    }),
                );
            }
        })
    }

    fn gateway_registration(&self, names: &[String]) -> GatewayRegistration {
        let counters = self.counters.clone();
        let names = names.to_vec();
        Box::new(move |mux: &mut GatewayMux, _: &GatewayContext| {
            counters.gateway.fetch_add(1, Ordering::SeqCst);
            for name in &names {
                mux.route(name, &format!("/api/test/{}", name), post(|| async { "pong" }))?;
            }
            Ok(())
        })
    }

    fn cleanups(&self) -> Vec<Cleanup> {
        let counters = self.counters.clone();
        vec![Arc::new(move || {
            counters.cleanup.fetch_add(1, Ordering::SeqCst);
        })]
    }
}
