//! Topology planning
//!
//! A `Topology` is computed once per start from the configured services and
//! then passed by reference to the composer, validator and lifecycle manager.

mod dependencies;
mod grouping;

pub use dependencies::{build_dependency_map, DependencyMap};
pub use grouping::{group_by_endpoint, EndpointGroup};

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::config::ApiConfig;

/// Endpoint groups plus the dependency edges between them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Topology {
    pub groups: BTreeMap<String, EndpointGroup>,
    pub dependencies: DependencyMap,
}

impl Topology {
    pub fn build(api: &ApiConfig) -> Self {
        let groups = group_by_endpoint(&api.services);
        let dependencies = build_dependency_map(&api.services);

        info!(
            "[Topology] {} service(s) on {} endpoint(s), {} dependency edge(s)",
            api.services.len(),
            groups.len(),
            dependencies.edge_count()
        );

        Self {
            groups,
            dependencies,
        }
    }

    /// Group that serves `service`
    pub fn group_of(&self, service: &str) -> Option<&EndpointGroup> {
        self.groups.values().find(|group| group.contains(service))
    }
}
