//! Authorizer capability
//!
//! Decisions are evaluated by the injected `PolicyEngine` and every answer is
//! recorded with the process decision logger before it is returned.

use std::sync::Arc;

use axum::{
    body::to_bytes,
    extract::Request,
    response::Json,
    routing::{get, post, MethodRouter},
};
use tracing::{debug, info, warn};
use warden_core::{
    services, Decision, DecisionLogger, DecisionRequest, DecisionResponse, PolicyEngine, PolicyInfo,
};

use super::{
    owned_services, Cleanup, GatewayContext, GatewayMux, GatewayRegistration, ProtocolRegistration,
    ProtocolServer, ServiceProvider,
};
use crate::http_error::ApiError;
use crate::middleware::Identity;

const CAPABILITIES: [&str; 1] = [services::AUTHORIZER];

/// Largest decision request accepted
const MAX_REQUEST_BYTES: usize = 4 * 1024 * 1024;

#[derive(Clone)]
struct AuthorizerHandlers {
    engine: Arc<dyn PolicyEngine>,
    decision_logger: Arc<dyn DecisionLogger>,
}

pub struct AuthorizerService {
    handlers: AuthorizerHandlers,
}

impl AuthorizerService {
    pub fn new(engine: Arc<dyn PolicyEngine>, decision_logger: Arc<dyn DecisionLogger>) -> Self {
        Self {
            handlers: AuthorizerHandlers {
                engine,
                decision_logger,
            },
        }
    }
}

impl ServiceProvider for AuthorizerService {
    fn name(&self) -> &'static str {
        "authorizer"
    }

    fn available_services(&self) -> Vec<&'static str> {
        CAPABILITIES.to_vec()
    }

    fn protocol_registrations(&self, names: &[String]) -> ProtocolRegistration {
        let enabled = !owned_services(&CAPABILITIES, names).is_empty();
        let handlers = self.handlers.clone();

        Box::new(move |server: &mut ProtocolServer| {
            if !enabled {
                return;
            }
            server.register_service(services::AUTHORIZER);
            server.route("/authorizer.v2/is", is_route(handlers.clone()));
            server.route("/authorizer.v2/info", info_route(handlers.clone()));
        })
    }

    fn gateway_registration(&self, names: &[String]) -> GatewayRegistration {
        let enabled = !owned_services(&CAPABILITIES, names).is_empty();
        let handlers = self.handlers.clone();

        Box::new(move |mux: &mut GatewayMux, ctx: &GatewayContext| {
            if !enabled {
                return Ok(());
            }
            mux.route(services::AUTHORIZER, "/api/v2/authz/is", is_route(handlers.clone()))?;
            mux.route(services::AUTHORIZER, "/api/v2/info", info_route(handlers.clone()))?;
            debug!("[Authorizer] Gateway mounted at {}", ctx.gateway.base_url());
            Ok(())
        })
    }

    fn cleanups(&self) -> Vec<Cleanup> {
        let engine = self.handlers.engine.clone();
        vec![Arc::new(move || {
            info!("[Authorizer] Closing policy engine");
            engine.close();
        })]
    }
}

fn is_route(handlers: AuthorizerHandlers) -> MethodRouter {
    post(move |request: Request| {
        let handlers = handlers.clone();
        async move { handlers.is(request).await }
    })
}

fn info_route(handlers: AuthorizerHandlers) -> MethodRouter {
    let for_post = handlers.clone();
    get(move || {
        let handlers = handlers.clone();
        async move { handlers.info().await }
    })
    .post(move || {
        let handlers = for_post.clone();
        async move { handlers.info().await }
    })
}

impl AuthorizerHandlers {
    async fn is(&self, request: Request) -> Result<Json<DecisionResponse>, ApiError> {
        let caller = request.extensions().get::<Identity>().cloned();
        let body = to_bytes(request.into_body(), MAX_REQUEST_BYTES)
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read request body: {}", e)))?;
        let mut decision_request: DecisionRequest = serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid decision request: {}", e)))?;

        if decision_request.policy_path.is_empty() {
            return Err(ApiError::bad_request("policy_path is required"));
        }
        if decision_request.identity.is_none() {
            decision_request.identity = caller.map(|identity| identity.0);
        }

        let response = self
            .engine
            .decide(&decision_request)
            .await
            .map_err(ApiError::upstream)?;

        let decision = Decision::new(&decision_request, &response);
        if let Err(e) = self.decision_logger.log(&decision).await {
            warn!("[Authorizer] Failed to record decision {}: {:#}", decision.id, e);
        }

        debug!(
            "[Authorizer] {} -> {:?}",
            decision_request.policy_path, response.decisions
        );
        Ok(Json(response))
    }

    async fn info(&self) -> Result<Json<PolicyInfo>, ApiError> {
        let info = self.engine.info().await.map_err(ApiError::upstream)?;
        Ok(Json(info))
    }
}
