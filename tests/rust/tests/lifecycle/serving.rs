//! Authorizer, directory, health and metrics over HTTP

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tests::async_helpers::{with_timeout, DEFAULT_TIMEOUT};
use tests::fixtures::{config, service};
use tests::http::{client, url};
use tests::{MockDirectoryProvider, MockDirectoryStore, MockPolicyEngine, RecordingDecisionLogger};
use warden_gateway::{DependenciesBuilder, Orchestrator, ServingStatus};

const API_KEY: &str = "s3cret";

struct Harness {
    orchestrator: Orchestrator,
    engine: Arc<MockPolicyEngine>,
    store: Arc<MockDirectoryStore>,
    logger: Arc<RecordingDecisionLogger>,
}

async fn start() -> Harness {
    let engine = Arc::new(MockPolicyEngine::new().deny("admin.DELETE"));
    let store = Arc::new(MockDirectoryStore::new());
    let logger = Arc::new(RecordingDecisionLogger::new());

    let deps = DependenciesBuilder::new()
        .with_policy_engine(engine.clone())
        .with_directory_provider(Arc::new(MockDirectoryProvider::new(store.clone())))
        .with_decision_logger(logger.clone())
        .build()
        .unwrap();

    let cfg = config(json!({
        "api": {
            "health": { "listen_address": "127.0.0.1:0" },
            "metrics": { "listen_address": "127.0.0.1:0", "zpages": true },
            "services": {
                "model": service("127.0.0.1:0", Some("127.0.0.1:0"), &[]),
                "reader": service("127.0.0.1:0", Some("127.0.0.1:0"), &[]),
                "authorizer": service("127.0.0.2:0", Some("127.0.0.2:0"), &["reader"])
            }
        },
        "edge": { "db_path": "/tmp/warden-directory.db" },
        "directory_resolver": { "address": "127.0.0.1:0" },
        "auth": { "api_keys": { "s3cret": "svc-a" } }
    }));

    let mut orchestrator = Orchestrator::new(cfg, deps).await.unwrap();
    orchestrator.config_services().await.unwrap();
    with_timeout(DEFAULT_TIMEOUT, orchestrator.start())
        .await
        .unwrap();

    Harness {
        orchestrator,
        engine,
        store,
        logger,
    }
}

#[tokio::test]
async fn test_health_reports_serving_after_start() {
    let mut harness = start().await;
    let addr = harness.orchestrator.manager().health_addr().unwrap();

    let response = client().get(url(addr, "/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "SERVING");
    assert_eq!(body["services"]["authorizer"], "SERVING");
    assert_eq!(body["services"]["reader"], "SERVING");

    let unknown = client().get(url(addr, "/health/writer")).send().await.unwrap();
    assert_eq!(unknown.status(), 404);

    harness.orchestrator.shutdown().await;
    assert_eq!(
        harness.orchestrator.manager().health().overall(),
        ServingStatus::NotServing
    );
}

#[tokio::test]
async fn test_authorizer_gateway_requires_api_key() {
    let mut harness = start().await;
    let gateway = harness
        .orchestrator
        .manager()
        .gateway_addr("127.0.0.2:0")
        .unwrap();
    let request = json!({ "policy_path": "todo.GET", "decisions": ["allowed"] });

    let rejected = client()
        .post(url(gateway, "/api/v2/authz/is"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), 401);
    assert!(harness.engine.requests().is_empty());

    let allowed = client()
        .post(url(gateway, "/api/v2/authz/is"))
        .bearer_auth(API_KEY)
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);
    let body: Value = allowed.json().await.unwrap();
    assert_eq!(body, json!({ "decisions": { "allowed": true } }));

    let requests = harness.engine.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].identity.as_deref(), Some("svc-a"));

    let decisions = harness.logger.decisions();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].policy_path, "todo.GET");

    harness.orchestrator.shutdown().await;
    assert!(harness.engine.is_closed());
    assert!(harness.logger.is_shut_down());
}

#[tokio::test]
async fn test_authorizer_protocol_denies() {
    let mut harness = start().await;
    let protocol = harness
        .orchestrator
        .manager()
        .protocol_addr("127.0.0.2:0")
        .unwrap();

    let response = client()
        .post(url(protocol, "/authorizer.v2/is"))
        .header("x-api-key", API_KEY)
        .json(&json!({ "policy_path": "admin.DELETE", "decisions": ["allowed"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["decisions"]["allowed"], false);

    let info: Value = client()
        .get(url(protocol, "/authorizer.v2/info"))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["name"], "mock");

    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_directory_requests_reach_store() {
    let mut harness = start().await;
    let manager = harness.orchestrator.manager();
    let protocol = manager.protocol_addr("127.0.0.1:0").unwrap();
    let gateway = manager.gateway_addr("127.0.0.1:0").unwrap();

    let body: Value = client()
        .post(url(protocol, "/reader.v3/get_object"))
        .header("x-api-key", API_KEY)
        .json(&json!({ "id": "doc-1" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["capability"], "reader");
    assert_eq!(body["request"]["id"], "doc-1");

    let response = client()
        .post(url(gateway, "/api/v3/directory/model/get_manifest"))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // writer is not configured, so its routes are not mounted
    let missing = client()
        .post(url(gateway, "/api/v3/directory/writer/set_object"))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    assert_eq!(
        harness.store.calls(),
        vec![
            ("reader".to_string(), "get_object".to_string()),
            ("model".to_string(), "get_manifest".to_string()),
        ]
    );

    harness.orchestrator.shutdown().await;
    assert!(harness.store.is_closed());
}

#[tokio::test]
async fn test_metrics_and_zpages() {
    let mut harness = start().await;
    let manager = harness.orchestrator.manager();
    let gateway = manager.gateway_addr("127.0.0.2:0").unwrap();
    let metrics = manager.metrics_addr().unwrap();

    client()
        .post(url(gateway, "/api/v2/authz/is"))
        .bearer_auth(API_KEY)
        .json(&json!({ "policy_path": "todo.GET", "decisions": ["allowed"] }))
        .send()
        .await
        .unwrap();

    let text = client()
        .get(url(metrics, "/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains(
        "warden_requests_total{method=\"POST\",route=\"/api/v2/authz/is\",code=\"200\"} 1"
    ));

    let servers: Value = client()
        .get(url(metrics, "/debug/servers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(servers.as_array().unwrap().len(), 2);

    harness.orchestrator.shutdown().await;
}
