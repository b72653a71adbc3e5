use super::{
    Cleanup, GatewayContext, GatewayMux, GatewayRegistration, ProtocolRegistration,
    ProtocolServer, ServiceProvider,
};
use warden_core::services;

/// Web console.
///
/// Has no protocol handlers of its own. Its HTTP routes are mounted by the
/// composer on the gateway of whichever group serves `console`.
#[derive(Debug, Default)]
pub struct ConsoleService;

impl ConsoleService {
    pub fn new() -> Self {
        Self
    }
}

impl ServiceProvider for ConsoleService {
    fn name(&self) -> &'static str {
        "console"
    }

    fn available_services(&self) -> Vec<&'static str> {
        vec![services::CONSOLE]
    }

    fn protocol_registrations(&self, names: &[String]) -> ProtocolRegistration {
        let enabled = names.iter().any(|s| s == services::CONSOLE);
        Box::new(move |server: &mut ProtocolServer| {
            if enabled {
                server.register_service(services::CONSOLE);
            }
        })
    }

    fn gateway_registration(&self, _names: &[String]) -> GatewayRegistration {
        Box::new(|_: &mut GatewayMux, _: &GatewayContext| Ok(()))
    }

    fn cleanups(&self) -> Vec<Cleanup> {
        Vec::new()
    }
}
