//! Composed servers
//!
//! A `ComposedServer` owns the protocol route table and gateway mux of one
//! endpoint group. It is built from the composer's descriptor, may still be
//! amended (console routes), and is turned into bound listeners on start.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tracing::{debug, warn};
use warden_core::config::{DEFAULT_READ_HEADER_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT};
use warden_core::{Error, Result, ServiceDefinition};

use crate::middleware::{self, Middleware};
use crate::registry::{Cleanup, GatewayMux, ProtocolServer};

/// Summary of a composed server for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub address: String,
    pub gateway_address: Option<String>,
    pub services: Vec<String>,
    pub protocol_routes: Vec<String>,
    pub gateway_routes: Vec<String>,
}

pub struct ComposedServer {
    pub(crate) address: String,
    pub(crate) services: Vec<String>,
    pub(crate) api: ServiceDefinition,
    pub(crate) middleware: Vec<Middleware>,
    pub(crate) protocol: ProtocolServer,
    pub(crate) gateway: Option<GatewayMux>,
    pub(crate) cleanups: Vec<Cleanup>,
}

impl std::fmt::Debug for ComposedServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedServer")
            .field("address", &self.address)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

impl ComposedServer {
    /// Protocol listen address, as configured
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn contains(&self, service: &str) -> bool {
        self.services.iter().any(|s| s == service)
    }

    pub fn api(&self) -> &ServiceDefinition {
        &self.api
    }

    pub fn protocol(&self) -> &ProtocolServer {
        &self.protocol
    }

    /// Gateway mux, `None` when the group has no gateway listen address
    pub fn gateway(&self) -> Option<&GatewayMux> {
        self.gateway.as_ref()
    }

    pub fn gateway_mut(&mut self) -> Option<&mut GatewayMux> {
        self.gateway.as_mut()
    }

    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            address: self.address.clone(),
            gateway_address: self
                .gateway
                .as_ref()
                .map(|_| self.api.gateway.listen_address.clone()),
            services: self.services.clone(),
            protocol_routes: self.protocol.routes().map(String::from).collect(),
            gateway_routes: self
                .gateway
                .as_ref()
                .map(|mux| mux.routes().map(String::from).collect())
                .unwrap_or_default(),
        }
    }

    /// Bind every listener of this server. Nothing is served yet.
    pub(crate) async fn bind(self) -> Result<BoundServer> {
        let protocol_listener = bind_listener(&self.address).await?;
        let protocol_addr = protocol_listener.local_addr()?;
        let protocol_router = middleware::apply(self.protocol.into_router(), &self.middleware);

        let gateway = match self.gateway {
            Some(mux) => {
                let listener = bind_listener(&self.api.gateway.listen_address).await?;
                let local = listener.local_addr()?;
                let router = gateway_router(mux, &self.api, &self.middleware);
                Some(BoundListener {
                    listener,
                    router,
                    local_addr: local,
                    header_read_timeout: Some(or_default(
                        self.api.gateway.read_header_timeout,
                        DEFAULT_READ_HEADER_TIMEOUT,
                    )),
                })
            }
            None => None,
        };

        debug!(
            "[Manager] Bound {} on {} ({})",
            self.address,
            protocol_addr,
            self.services.join(", ")
        );

        Ok(BoundServer {
            address: self.address,
            protocol: BoundListener {
                listener: protocol_listener,
                router: protocol_router,
                local_addr: protocol_addr,
                header_read_timeout: None,
            },
            gateway,
        })
    }
}

fn gateway_router(mux: GatewayMux, api: &ServiceDefinition, chain: &[Middleware]) -> Router {
    let gateway = &api.gateway;
    if gateway.certs.is_some() && !gateway.http {
        warn!(
            "[Manager] TLS is not terminated here, gateway {} serves plain HTTP",
            gateway.listen_address
        );
    }
    let router = mux
        .into_router()
        .layer(TimeoutLayer::new(or_default(gateway.write_timeout, DEFAULT_WRITE_TIMEOUT)))
        .layer(RequestBodyTimeoutLayer::new(or_default(
            gateway.read_timeout,
            DEFAULT_READ_TIMEOUT,
        )));
    middleware::apply(router, chain)
}

fn or_default(timeout: Duration, default: Duration) -> Duration {
    if timeout.is_zero() {
        default
    } else {
        timeout
    }
}

/// Serve HTTP/1 connections from `listener` until `cancel` fires.
///
/// A client that has not sent a complete request head within
/// `header_read_timeout` is disconnected. In-flight connections are shut
/// down gracefully and awaited.
pub(crate) async fn serve_http1(
    listener: TcpListener,
    router: Router,
    header_read_timeout: Duration,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let connections = TaskTracker::new();

    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("[Manager] Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            },
        };

        let service = TowerToHyperService::new(router.clone());
        let cancel = cancel.clone();
        connections.spawn(async move {
            let mut builder = http1::Builder::new();
            builder
                .timer(TokioTimer::new())
                .header_read_timeout(header_read_timeout);
            let conn = builder.serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = cancel.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };
            if let Err(e) = result {
                debug!("[Manager] Connection from {} closed: {}", peer, e);
            }
        });
    }

    connections.close();
    connections.wait().await;
    Ok(())
}

pub(crate) struct BoundListener {
    pub listener: TcpListener,
    pub router: Router,
    pub local_addr: SocketAddr,
    /// Set for gateway listeners, which are served through `serve_http1`
    pub header_read_timeout: Option<Duration>,
}

pub(crate) struct BoundServer {
    pub address: String,
    pub protocol: BoundListener,
    pub gateway: Option<BoundListener>,
}

/// `:port` addresses listen on every interface
pub fn normalize_listen_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{}", address)
    } else {
        address.to_string()
    }
}

pub(crate) async fn bind_listener(address: &str) -> Result<TcpListener> {
    if address.is_empty() {
        return Err(Error::startup("empty listen address"));
    }
    let target = normalize_listen_address(address);
    TcpListener::bind(&target)
        .await
        .map_err(|e| Error::startup(format!("failed to listen on {}: {}", target, e)))
}
