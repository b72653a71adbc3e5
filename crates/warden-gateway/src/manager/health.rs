//! Health reporting
//!
//! Mirrors the gRPC health protocol: an overall status under the empty
//! service name plus one status per configured service.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Name of the overall server status
pub const OVERALL: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Unknown,
    Serving,
    NotServing,
    ServiceUnknown,
}

impl ServingStatus {
    fn http_status(self) -> StatusCode {
        match self {
            Self::Serving => StatusCode::OK,
            Self::ServiceUnknown => StatusCode::NOT_FOUND,
            Self::Unknown | Self::NotServing => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HealthReporter {
    statuses: Arc<RwLock<BTreeMap<String, ServingStatus>>>,
}

impl HealthReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, service: &str, status: ServingStatus) {
        self.statuses.write().insert(service.to_string(), status);
    }

    /// Status of `service`, `None` if it was never published
    pub fn get(&self, service: &str) -> Option<ServingStatus> {
        self.statuses.read().get(service).copied()
    }

    pub fn overall(&self) -> ServingStatus {
        self.get(OVERALL).unwrap_or(ServingStatus::Unknown)
    }

    /// Mark every published status as not serving
    pub fn shutdown(&self) {
        for status in self.statuses.write().values_mut() {
            *status = ServingStatus::NotServing;
        }
    }

    /// Per-service statuses, overall entry excluded
    pub fn snapshot(&self) -> BTreeMap<String, ServingStatus> {
        self.statuses
            .read()
            .iter()
            .filter(|(name, _)| name.as_str() != OVERALL)
            .map(|(name, status)| (name.clone(), *status))
            .collect()
    }
}

pub fn health_router(reporter: HealthReporter) -> Router {
    Router::new()
        .route("/health", get(overall_handler))
        .route("/health/{service}", get(service_handler))
        .with_state(reporter)
}

async fn overall_handler(State(reporter): State<HealthReporter>) -> Response {
    let status = reporter.overall();
    (
        status.http_status(),
        Json(json!({ "status": status, "services": reporter.snapshot() })),
    )
        .into_response()
}

async fn service_handler(
    State(reporter): State<HealthReporter>,
    Path(service): Path<String>,
) -> Response {
    let status = reporter
        .get(&service)
        .unwrap_or(ServingStatus::ServiceUnknown);
    (
        status.http_status(),
        Json(json!({ "service": service, "status": status })),
    )
        .into_response()
}
