//! Request metrics and the metrics/zpages server
//!
//! Counters live in `DashMap`s keyed by method, matched route and status and
//! are rendered in the Prometheus text format on `GET /metrics`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use dashmap::DashMap;
use parking_lot::RwLock;

use super::health::{HealthReporter, ServingStatus};
use super::server::ServerInfo;

/// Label used for requests that matched no route
const UNMATCHED_ROUTE: &str = "unmatched";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct RequestKey {
    method: String,
    route: String,
    status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct RouteKey {
    method: String,
    route: String,
}

#[derive(Debug, Clone, Copy, Default)]
struct DurationStats {
    count: u64,
    sum_seconds: f64,
}

/// Counters shared by every composed server
#[derive(Debug, Default)]
pub struct RequestMetrics {
    requests: DashMap<RequestKey, u64>,
    durations: DashMap<RouteKey, DurationStats>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        *self
            .requests
            .entry(RequestKey {
                method: method.to_string(),
                route: route.to_string(),
                status,
            })
            .or_insert(0) += 1;

        let mut stats = self
            .durations
            .entry(RouteKey {
                method: method.to_string(),
                route: route.to_string(),
            })
            .or_default();
        stats.count += 1;
        stats.sum_seconds += elapsed.as_secs_f64();
    }

    pub fn requests_total(&self) -> u64 {
        self.requests.iter().map(|entry| *entry.value()).sum()
    }

    /// Prometheus text exposition, series sorted for stable output
    pub fn render(&self) -> String {
        let requests: BTreeMap<RequestKey, u64> = self
            .requests
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        let durations: BTreeMap<RouteKey, DurationStats> = self
            .durations
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let mut out = String::new();
        out.push_str("# HELP warden_requests_total Requests handled by composed servers\n");
        out.push_str("# TYPE warden_requests_total counter\n");
        for (key, count) in &requests {
            let _ = writeln!(
                out,
                "warden_requests_total{{method=\"{}\",route=\"{}\",code=\"{}\"}} {}",
                key.method,
                escape(&key.route),
                key.status,
                count
            );
        }

        out.push_str("# HELP warden_request_duration_seconds Request latency\n");
        out.push_str("# TYPE warden_request_duration_seconds summary\n");
        for (key, stats) in &durations {
            let labels = format!("method=\"{}\",route=\"{}\"", key.method, escape(&key.route));
            let _ = writeln!(
                out,
                "warden_request_duration_seconds_sum{{{}}} {}",
                labels, stats.sum_seconds
            );
            let _ = writeln!(
                out,
                "warden_request_duration_seconds_count{{{}}} {}",
                labels, stats.count
            );
        }

        out
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Records one sample per request against the matched route template
pub async fn metrics_middleware(
    State(metrics): State<Arc<RequestMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
    let started = Instant::now();

    let response = next.run(request).await;
    metrics.record(&method, &route, response.status().as_u16(), started.elapsed());
    response
}

/// Diagnostics served under `/debug` when zpages are enabled
#[derive(Clone)]
pub struct ZPages {
    pub servers: Arc<RwLock<Vec<ServerInfo>>>,
    pub health: HealthReporter,
}

pub fn metrics_router(metrics: Arc<RequestMetrics>, zpages: Option<ZPages>) -> Router {
    let mut router = Router::new().route("/metrics", get(render_handler).with_state(metrics));

    if let Some(zpages) = zpages {
        router = router
            .route("/debug/servers", get(servers_handler).with_state(zpages.clone()))
            .route("/debug/health", get(health_handler).with_state(zpages));
    }

    router
}

async fn render_handler(State(metrics): State<Arc<RequestMetrics>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.render(),
    )
        .into_response()
}

async fn servers_handler(State(zpages): State<ZPages>) -> Json<Vec<ServerInfo>> {
    Json(zpages.servers.read().clone())
}

async fn health_handler(State(zpages): State<ZPages>) -> Json<BTreeMap<String, ServingStatus>> {
    Json(zpages.health.snapshot())
}
