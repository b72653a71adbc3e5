//! Lifecycle manager
//!
//! Owns the composed servers plus the optional health and metrics servers.
//! `start_servers` binds endpoints in dependency waves: every listener of a
//! wave is accepting before the next wave is bound. All servers share one
//! cancellation token and stop together on `shutdown`.

mod health;
mod metrics;
mod server;

pub use health::{health_router, HealthReporter, ServingStatus, OVERALL};
pub use metrics::{metrics_middleware, metrics_router, RequestMetrics, ZPages};
pub use server::{normalize_listen_address, ComposedServer, ServerInfo};

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures::future::try_join_all;
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warden_core::config::CertsConfig;
use warden_core::{DependencyMap, Error, Result};

use crate::composer::ServerDescriptor;
use crate::middleware::Middleware;
use crate::registry::{Cleanup, GatewayContext, GatewayMux, ProtocolServer};
use server::{bind_listener, BoundServer};

struct AuxServer {
    address: String,
    router: Router,
}

pub struct ServiceManager {
    servers: Vec<ComposedServer>,
    infos: Arc<RwLock<Vec<ServerInfo>>>,
    health: HealthReporter,
    health_server: Option<AuxServer>,
    metrics: Option<Arc<RequestMetrics>>,
    metrics_server: Option<AuxServer>,
    cleanups: Vec<Cleanup>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    protocol_addrs: BTreeMap<String, SocketAddr>,
    gateway_addrs: BTreeMap<String, SocketAddr>,
    health_addr: Option<SocketAddr>,
    metrics_addr: Option<SocketAddr>,
    started: bool,
}

impl ServiceManager {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            servers: Vec::new(),
            infos: Arc::new(RwLock::new(Vec::new())),
            health: HealthReporter::new(),
            health_server: None,
            metrics: None,
            metrics_server: None,
            cleanups: Vec::new(),
            cancel,
            tasks: Vec::new(),
            protocol_addrs: BTreeMap::new(),
            gateway_addrs: BTreeMap::new(),
            health_addr: None,
            metrics_addr: None,
            started: false,
        }
    }

    /// Serve `/health` on `address` once servers start
    pub fn setup_health_server(&mut self, address: &str, certs: Option<&CertsConfig>) -> Result<()> {
        if address.is_empty() {
            return Err(Error::configuration("health listen address is empty"));
        }
        warn_plaintext("health", address, certs);

        self.health.set(OVERALL, ServingStatus::NotServing);
        self.health_server = Some(AuxServer {
            address: address.to_string(),
            router: health_router(self.health.clone()),
        });
        info!("[Manager] Health server configured on {}", address);
        Ok(())
    }

    /// Serve `/metrics` (and `/debug/*` with zpages) on `address`.
    ///
    /// Returns the middleware that feeds the request counters; the composer
    /// appends it to every server's chain.
    pub fn setup_metrics_server(
        &mut self,
        address: &str,
        certs: Option<&CertsConfig>,
        zpages: bool,
    ) -> Result<Vec<Middleware>> {
        if address.is_empty() {
            return Err(Error::configuration("metrics listen address is empty"));
        }
        warn_plaintext("metrics", address, certs);

        let metrics = Arc::new(RequestMetrics::new());
        let zpages = zpages.then(|| ZPages {
            servers: self.infos.clone(),
            health: self.health.clone(),
        });
        self.metrics_server = Some(AuxServer {
            address: address.to_string(),
            router: metrics_router(metrics.clone(), zpages),
        });
        self.metrics = Some(metrics.clone());
        info!("[Manager] Metrics server configured on {}", address);

        let layer: Middleware = Arc::new(move |router: Router| {
            router.layer(axum::middleware::from_fn_with_state(
                metrics.clone(),
                metrics_middleware,
            ))
        });
        Ok(vec![layer])
    }

    /// Build a composed server by running the descriptor's registrations.
    ///
    /// A failing gateway registration aborts with the routes mounted so far
    /// left on the (discarded) mux.
    pub fn create_server(&self, descriptor: ServerDescriptor) -> Result<ComposedServer> {
        let ServerDescriptor {
            address,
            services,
            api,
            middleware,
            protocol,
            gateway,
            cleanups,
        } = descriptor;

        let mut protocol_server = ProtocolServer::new();
        protocol(&mut protocol_server);

        let gateway_mux = if api.gateway.is_enabled() {
            let mut mux = GatewayMux::new();
            let ctx = GatewayContext {
                protocol_address: address.clone(),
                gateway: api.gateway.clone(),
            };
            gateway(&mut mux, &ctx)?;
            Some(mux)
        } else {
            debug!("[Manager] {} has no gateway listen address", address);
            None
        };

        Ok(ComposedServer {
            address,
            services,
            api,
            middleware,
            protocol: protocol_server,
            gateway: gateway_mux,
            cleanups,
        })
    }

    pub fn add_server(&mut self, mut server: ComposedServer) -> Result<()> {
        if self.started {
            return Err(Error::startup("servers already started"));
        }
        if self.servers.iter().any(|s| s.address == server.address) {
            return Err(Error::startup(format!(
                "a server is already registered on {}",
                server.address
            )));
        }

        self.cleanups.append(&mut server.cleanups);
        self.infos.write().push(server.info());
        info!(
            "[Manager] Added server {} ({})",
            server.address,
            server.services.join(", ")
        );
        self.servers.push(server);
        Ok(())
    }

    pub fn servers(&self) -> &[ComposedServer] {
        &self.servers
    }

    pub fn server_infos(&self) -> Vec<ServerInfo> {
        self.infos.read().clone()
    }

    /// Start order for the registered servers
    pub fn startup_waves(&self, dependencies: &DependencyMap) -> Result<Vec<Vec<String>>> {
        let addresses: Vec<String> = self.servers.iter().map(|s| s.address.clone()).collect();
        plan_waves(&addresses, dependencies)
    }

    /// Bind and serve every server, dependencies first.
    ///
    /// On failure every task spawned so far is cancelled and awaited.
    pub async fn start_servers(&mut self, dependencies: &DependencyMap) -> Result<()> {
        if self.started {
            return Err(Error::startup("servers already started"));
        }
        let waves = self.startup_waves(dependencies)?;
        self.started = true;

        if let Err(e) = self.start_waves(waves).await {
            error!("[Manager] Startup failed: {}", e);
            self.stop_tasks().await;
            return Err(e);
        }

        info!(
            "[Manager] {} server(s) running",
            self.protocol_addrs.len()
        );
        Ok(())
    }

    async fn start_waves(&mut self, waves: Vec<Vec<String>>) -> Result<()> {
        if let Some(aux) = self.health_server.take() {
            let listener = bind_listener(&aux.address).await?;
            self.health_addr = Some(listener.local_addr()?);
            self.spawn(format!("health {}", aux.address), listener, aux.router, None);
        }
        if let Some(aux) = self.metrics_server.take() {
            let listener = bind_listener(&aux.address).await?;
            self.metrics_addr = Some(listener.local_addr()?);
            self.spawn(format!("metrics {}", aux.address), listener, aux.router, None);
        }

        let mut pending: BTreeMap<String, ComposedServer> = self
            .servers
            .drain(..)
            .map(|server| (server.address.clone(), server))
            .collect();

        for (index, wave) in waves.into_iter().enumerate() {
            debug!("[Manager] Starting wave {}: {}", index, wave.join(", "));
            let batch: Vec<ComposedServer> = wave
                .iter()
                .filter_map(|address| pending.remove(address))
                .collect();

            let bound = try_join_all(batch.into_iter().map(ComposedServer::bind)).await?;
            for server in bound {
                self.serve(server);
            }
        }

        Ok(())
    }

    fn serve(&mut self, server: BoundServer) {
        let BoundServer {
            address,
            protocol,
            gateway,
        } = server;

        self.protocol_addrs.insert(address.clone(), protocol.local_addr);
        info!("[Manager] Serving {} on {}", address, protocol.local_addr);
        self.spawn(
            format!("protocol {}", address),
            protocol.listener,
            protocol.router,
            protocol.header_read_timeout,
        );

        if let Some(gateway) = gateway {
            self.gateway_addrs.insert(address.clone(), gateway.local_addr);
            info!("[Manager] Gateway for {} on {}", address, gateway.local_addr);
            self.spawn(
                format!("gateway {}", address),
                gateway.listener,
                gateway.router,
                gateway.header_read_timeout,
            );
        }
    }

    fn spawn(
        &mut self,
        label: String,
        listener: TcpListener,
        router: Router,
        header_read_timeout: Option<Duration>,
    ) {
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            let result = match header_read_timeout {
                Some(timeout) => server::serve_http1(listener, router, timeout, cancel).await,
                None => {
                    axum::serve(listener, router)
                        .with_graceful_shutdown(async move { cancel.cancelled().await })
                        .await
                }
            };
            match result {
                Ok(()) => debug!("[Manager] {} stopped", label),
                Err(e) => error!("[Manager] {} failed: {}", label, e),
            }
        }));
    }

    async fn stop_tasks(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("[Manager] Server task panicked: {}", e);
            }
        }
    }

    pub fn set_service_status(&self, service: &str, status: ServingStatus) {
        self.health.set(service, status);
    }

    pub fn health(&self) -> &HealthReporter {
        &self.health
    }

    pub fn metrics(&self) -> Option<&Arc<RequestMetrics>> {
        self.metrics.as_ref()
    }

    pub fn has_health_server(&self) -> bool {
        self.health_server.is_some() || self.health_addr.is_some()
    }

    /// Bound protocol address of the server configured on `address`
    pub fn protocol_addr(&self, address: &str) -> Option<SocketAddr> {
        self.protocol_addrs.get(address).copied()
    }

    /// Bound gateway address of the server configured on `address`
    pub fn gateway_addr(&self, address: &str) -> Option<SocketAddr> {
        self.gateway_addrs.get(address).copied()
    }

    pub fn health_addr(&self) -> Option<SocketAddr> {
        self.health_addr
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Stop every server and run the collected cleanups once
    pub async fn shutdown(&mut self) {
        info!("[Manager] Shutting down");
        self.health.shutdown();
        self.stop_tasks().await;

        for cleanup in self.cleanups.drain(..) {
            cleanup();
        }
    }
}

fn warn_plaintext(kind: &str, address: &str, certs: Option<&CertsConfig>) {
    if certs.is_some() {
        warn!(
            "[Manager] TLS is not terminated here, {} server on {} serves plain HTTP",
            kind, address
        );
    }
}

/// Kahn's algorithm over endpoint addresses.
///
/// Each wave holds the endpoints whose dependencies all started in earlier
/// waves. Edges to endpoints without a server are ignored. A cycle is a
/// startup error.
pub fn plan_waves(addresses: &[String], dependencies: &DependencyMap) -> Result<Vec<Vec<String>>> {
    let known: BTreeSet<&str> = addresses.iter().map(String::as_str).collect();

    let mut remaining: BTreeMap<&str, BTreeSet<&str>> = known
        .iter()
        .map(|address| {
            let needs = dependencies
                .dependencies_of(address)
                .iter()
                .map(String::as_str)
                .filter(|dep| {
                    let present = known.contains(dep);
                    if !present {
                        debug!("[Manager] {} needs {} which has no server", address, dep);
                    }
                    present
                })
                .collect();
            (*address, needs)
        })
        .collect();

    let mut waves = Vec::new();
    while !remaining.is_empty() {
        let ready: Vec<&str> = remaining
            .iter()
            .filter(|(_, needs)| needs.is_empty())
            .map(|(address, _)| *address)
            .collect();

        if ready.is_empty() {
            let stuck: Vec<&str> = remaining.keys().copied().collect();
            return Err(Error::startup(format!(
                "dependency cycle between endpoints: {}",
                stuck.join(", ")
            )));
        }

        for address in &ready {
            remaining.remove(address);
        }
        for needs in remaining.values_mut() {
            for address in &ready {
                needs.remove(address);
            }
        }

        waves.push(ready.into_iter().map(String::from).collect());
    }

    Ok(waves)
}
