//! External collaborator traits
//!
//! Policy evaluation and directory storage live outside this workspace.
//! The orchestrator only routes requests to them through these seams.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EdgeConfig;

/// Authorization question asked of the policy engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Caller identity, if the request carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Policy package path, e.g. `todo.GET.todos`
    pub policy_path: String,
    /// Decision names to evaluate, e.g. `["allowed"]`
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub resource: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub decisions: BTreeMap<String, bool>,
}

/// Build and policy information reported by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub policies: Vec<String>,
}

/// Policy evaluation engine
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    async fn decide(&self, request: &DecisionRequest) -> anyhow::Result<DecisionResponse>;

    async fn info(&self) -> anyhow::Result<PolicyInfo>;

    /// Release engine resources at shutdown
    fn close(&self) {}
}

/// Directory storage engine
///
/// Requests are dispatched by capability (`reader`, `writer`, ...) and method
/// name, with JSON bodies in both directions.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn call(&self, capability: &str, method: &str, request: Value) -> anyhow::Result<Value>;

    /// Flush and close the store at shutdown
    fn close(&self) {}
}

/// Opens the directory store described by the `edge` config block
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    async fn open(&self, config: &EdgeConfig) -> anyhow::Result<Arc<dyn DirectoryStore>>;
}
