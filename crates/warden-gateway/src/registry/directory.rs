//! Embedded directory (edge) capabilities
//!
//! Every capability is a thin JSON dispatcher in front of the injected
//! `DirectoryStore`: `POST /{capability}.v3/{method}` on the protocol
//! listener and `POST /api/v3/directory/{capability}/{method}` on the gateway.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Path,
    response::Json,
    routing::{post, MethodRouter},
};
use serde_json::Value;
use tracing::{debug, info};
use warden_core::{services, DirectoryStore};

use super::{
    owned_services, Cleanup, GatewayContext, GatewayMux, GatewayRegistration, ProtocolRegistration,
    ProtocolServer, ServiceProvider,
};
use crate::http_error::ApiError;

const CAPABILITIES: [&str; 5] = [
    services::READER,
    services::WRITER,
    services::EXPORTER,
    services::IMPORTER,
    services::MODEL,
];

pub struct DirectoryService {
    store: Arc<dyn DirectoryStore>,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }
}

impl ServiceProvider for DirectoryService {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn available_services(&self) -> Vec<&'static str> {
        CAPABILITIES.to_vec()
    }

    fn protocol_registrations(&self, names: &[String]) -> ProtocolRegistration {
        let owned = owned_services(&CAPABILITIES, names);
        let store = self.store.clone();

        Box::new(move |server: &mut ProtocolServer| {
            for capability in owned.iter().copied() {
                server.register_service(capability);
                server.route(
                    &format!("/{}.v3/{{method}}", capability),
                    dispatcher(store.clone(), capability),
                );
            }
        })
    }

    fn gateway_registration(&self, names: &[String]) -> GatewayRegistration {
        let owned = owned_services(&CAPABILITIES, names);
        let store = self.store.clone();

        Box::new(move |mux: &mut GatewayMux, ctx: &GatewayContext| {
            for capability in owned.iter().copied() {
                mux.route(
                    capability,
                    &format!("/api/v3/directory/{}/{{method}}", capability),
                    dispatcher(store.clone(), capability),
                )?;
            }
            debug!(
                "[Directory] Gateway handlers for {} proxy {}",
                owned.join(", "),
                ctx.protocol_address
            );
            Ok(())
        })
    }

    fn cleanups(&self) -> Vec<Cleanup> {
        let store = self.store.clone();
        vec![Arc::new(move || {
            info!("[Directory] Closing directory store");
            store.close();
        })]
    }
}

fn dispatcher(store: Arc<dyn DirectoryStore>, capability: &'static str) -> MethodRouter {
    post(move |Path(method): Path<String>, body: Bytes| {
        let store = store.clone();
        async move { call(store.as_ref(), capability, &method, &body).await }
    })
}

async fn call(
    store: &dyn DirectoryStore,
    capability: &str,
    method: &str,
    body: &[u8],
) -> Result<Json<Value>, ApiError> {
    let request = if body.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(body)
            .map_err(|e| ApiError::bad_request(format!("invalid request body: {}", e)))?
    };

    debug!("[Directory] {}.{}", capability, method);
    let response = store
        .call(capability, method, request)
        .await
        .map_err(ApiError::upstream)?;
    Ok(Json(response))
}
