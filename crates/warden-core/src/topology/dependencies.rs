//! Inter-endpoint dependency graph
//!
//! Built from each service's `needs` list. Only edges between different
//! endpoints are recorded; services sharing an endpoint start together.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::config::ServiceDefinition;

/// endpoint -> endpoints that must be accepting connections first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DependencyMap {
    edges: BTreeMap<String, Vec<String>>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `dependent -> dependency`.
    ///
    /// Returns false when the edge was dropped, either because both ends are
    /// the same endpoint or because it already exists.
    pub fn add_edge(&mut self, dependent: &str, dependency: &str) -> bool {
        if dependent == dependency {
            return false;
        }
        let deps = self.edges.entry(dependent.to_string()).or_default();
        if deps.iter().any(|d| d == dependency) {
            return false;
        }
        deps.push(dependency.to_string());
        true
    }

    /// Endpoints `endpoint` waits for
    pub fn dependencies_of(&self, endpoint: &str) -> &[String] {
        self.edges.get(endpoint).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.edges.iter()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count() == 0
    }
}

/// Resolve every `needs` entry to an endpoint edge.
///
/// Names that refer to services missing from the configuration are skipped
/// with a warning rather than failing start.
pub fn build_dependency_map(services: &BTreeMap<String, ServiceDefinition>) -> DependencyMap {
    let mut map = DependencyMap::new();

    for (name, definition) in services {
        for needed in &definition.needs {
            match services.get(needed) {
                Some(dependency) => {
                    map.add_edge(definition.endpoint(), dependency.endpoint());
                }
                None => {
                    warn!(
                        "[Topology] Service '{}' needs '{}', which is not configured; ignoring",
                        name, needed
                    );
                }
            }
        }
    }

    map
}
