//! Composer
//!
//! Turns each endpoint group into one composed server: the providers that
//! serve the group's capabilities contribute their protocol and gateway
//! registrations, which are merged into a single closure each, wrapped with
//! the group's middleware chain and handed to the lifecycle manager.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};
use warden_core::{services, Config, EndpointGroup, Result, ServiceDefinition, Topology};

use crate::console;
use crate::manager::ServiceManager;
use crate::middleware::{self, Middleware};
use crate::registry::{
    Cleanup, GatewayContext, GatewayMux, GatewayRegistration, ProtocolRegistration,
    ProtocolServer, ServiceRegistry,
};

/// Everything the lifecycle manager needs to build one composed server
pub struct ServerDescriptor {
    pub address: String,
    pub services: Vec<String>,
    pub api: ServiceDefinition,
    pub middleware: Vec<Middleware>,
    pub protocol: ProtocolRegistration,
    pub gateway: GatewayRegistration,
    pub cleanups: Vec<Cleanup>,
}

/// Contributions collected from the providers of one group
#[derive(Default)]
struct Contributions {
    providers: Vec<String>,
    protocol: Vec<ProtocolRegistration>,
    gateway: Vec<GatewayRegistration>,
    cleanups: Vec<Cleanup>,
}

/// Compose every group of `topology` and register it with `manager`.
///
/// `shared` is appended to each group's own chain (the metrics middleware).
/// Returns the number of servers added.
pub fn compose(
    config: &Arc<Config>,
    topology: &Topology,
    registry: &ServiceRegistry,
    shared: &[Middleware],
    manager: &mut ServiceManager,
) -> Result<usize> {
    let mut added = 0;

    for group in topology.groups.values() {
        let mut chain = middleware::for_services(config, group);
        chain.extend(shared.iter().cloned());

        let contributions = collect(group, registry);
        debug!(
            "[Composer] {} [{}] served by {}",
            group.address,
            group.service_names.join(", "),
            if contributions.providers.is_empty() {
                "no provider".to_string()
            } else {
                contributions.providers.join(", ")
            }
        );

        let descriptor = ServerDescriptor {
            address: group.address.clone(),
            services: group.service_names.clone(),
            api: group.api.clone(),
            middleware: chain,
            protocol: merge_protocol(contributions.protocol),
            gateway: merge_gateway(contributions.gateway),
            cleanups: contributions.cleanups,
        };

        let mut server = manager.create_server(descriptor)?;

        if group.contains(services::CONSOLE) {
            match server.gateway_mut() {
                Some(mux) => console::mount(mux, config.clone())?,
                None => warn!(
                    "[Composer] console is served on {} without a gateway address, UI routes are not mounted",
                    group.address
                ),
            }
        }

        manager.add_server(server)?;
        added += 1;
    }

    info!("[Composer] Composed {} server(s)", added);
    Ok(added)
}

/// Pick the providers for a group in registry order.
///
/// A capability belongs to the first provider that advertises it; a later
/// provider is only used for the capabilities still unclaimed and only sees
/// those names.
fn collect(group: &EndpointGroup, registry: &ServiceRegistry) -> Contributions {
    let mut claimed: BTreeSet<&'static str> = BTreeSet::new();
    let mut contributions = Contributions::default();

    for (key, provider) in registry.providers() {
        let fresh: Vec<&'static str> = provider
            .available_services()
            .into_iter()
            .filter(|capability| group.contains(capability) && !claimed.contains(capability))
            .collect();
        if fresh.is_empty() {
            continue;
        }

        let names: Vec<String> = fresh.iter().map(|s| s.to_string()).collect();
        contributions.protocol.push(provider.protocol_registrations(&names));
        contributions.gateway.push(provider.gateway_registration(&names));
        contributions.cleanups.extend(provider.cleanups());
        contributions.providers.push(key.to_string());
        claimed.extend(fresh);
    }

    contributions
}

fn merge_protocol(registrations: Vec<ProtocolRegistration>) -> ProtocolRegistration {
    Box::new(move |server: &mut ProtocolServer| {
        for register in &registrations {
            register(server);
        }
    })
}

/// Stops at the first failing registration; routes mounted before it stay
fn merge_gateway(registrations: Vec<GatewayRegistration>) -> GatewayRegistration {
    Box::new(move |mux: &mut GatewayMux, ctx: &GatewayContext| {
        for register in &registrations {
            register(mux, ctx)?;
        }
        Ok(())
    })
}
