//! Endpoint grouping
//!
//! Services that share a protocol listen address are served by one composed
//! server. The first definition seen for an address supplies the group's
//! transport settings; later definitions only contribute their names.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::config::ServiceDefinition;

/// Services bound to one network endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointGroup {
    /// Protocol listen address shared by every service in the group
    pub address: String,
    /// Service names bound here, in grouping order
    pub service_names: Vec<String>,
    /// Effective transport settings, gateway timeout defaults applied
    pub api: ServiceDefinition,
}

impl EndpointGroup {
    pub fn contains(&self, service: &str) -> bool {
        self.service_names.iter().any(|name| name == service)
    }
}

/// Partition services by endpoint
pub fn group_by_endpoint(
    services: &BTreeMap<String, ServiceDefinition>,
) -> BTreeMap<String, EndpointGroup> {
    let mut groups: BTreeMap<String, EndpointGroup> = BTreeMap::new();

    for (name, definition) in services {
        let address = definition.endpoint().to_string();
        let group = groups.entry(address.clone()).or_insert_with(|| {
            let mut api = definition.clone();
            api.gateway.apply_default_timeouts();
            EndpointGroup {
                address: address.clone(),
                service_names: Vec::new(),
                api,
            }
        });
        group.service_names.push(name.clone());
        debug!("[Topology] {} -> {}", name, address);
    }

    groups
}
