//! Topology validation
//!
//! Global consistency rules checked once, after composition and before any
//! listener is bound.

use tracing::info;
use warden_core::{services, Config, Error, Result};

use crate::registry::ServiceRegistry;

pub fn validate(config: &Config, registry: &ServiceRegistry) -> Result<()> {
    if let Some(reader) = config.service(services::READER) {
        if reader.grpc.listen_address != config.directory_resolver.address {
            return Err(Error::configuration(
                "remote directory resolver address is different from reader grpc address",
            ));
        }
    }

    if config.has_service(services::CONSOLE) && !config.has_service(services::MODEL) {
        return Err(Error::configuration(
            "console needs the model service to be configured",
        ));
    }

    if !config.has_service(services::MODEL) {
        info!("[Validation] model service is not configured, the directory manifest cannot be read or updated");
    }

    for name in config.api.services.keys() {
        if !registry.advertises(name) {
            return Err(Error::configuration(format!("unknown service type {}", name)));
        }
    }

    Ok(())
}
