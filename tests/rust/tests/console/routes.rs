//! Console routes over HTTP

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use tests::async_helpers::{with_timeout, DEFAULT_TIMEOUT};
use tests::fixtures::{config, service};
use tests::http::{client, url};
use tests::{MockDirectoryProvider, MockDirectoryStore, MockPolicyEngine};
use warden_gateway::{DependenciesBuilder, Orchestrator};

fn assets() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("index.html"), "<html>warden console</html>").unwrap();
    std::fs::write(dir.path().join("main.js"), "boot()").unwrap();
    std::fs::create_dir(dir.path().join("public")).unwrap();
    std::fs::write(dir.path().join("public").join("logo.svg"), "<svg/>").unwrap();
    dir
}

async fn start(assets: &TempDir, share_api_key: bool) -> Orchestrator {
    let deps = DependenciesBuilder::new()
        .with_policy_engine(Arc::new(MockPolicyEngine::new()))
        .with_directory_provider(Arc::new(MockDirectoryProvider::new(Arc::new(
            MockDirectoryStore::new(),
        ))))
        .build()
        .unwrap();

    let cfg = config(json!({
        "api": {
            "services": {
                "console": service("127.0.0.1:0", Some("127.0.0.1:0"), &[]),
                "model": service("127.0.0.1:0", Some("127.0.0.1:0"), &[]),
                "reader": service("127.0.0.1:0", Some("127.0.0.1:0"), &[]),
                "authorizer": service("127.0.0.2:0", Some("127.0.0.2:0"), &[])
            }
        },
        "edge": { "db_path": "/tmp/warden-directory.db" },
        "directory_resolver": { "address": "127.0.0.1:0", "tenant_id": "tenant-1" },
        "auth": { "api_keys": { "console-key": "console" } },
        "console": { "assets_dir": assets.path(), "share_api_key": share_api_key }
    }));

    let mut orchestrator = Orchestrator::new(cfg, deps).await.unwrap();
    orchestrator.config_services().await.unwrap();
    orchestrator
}

#[tokio::test]
async fn test_console_routes_are_public() {
    let dir = assets();
    let mut orchestrator = start(&dir, true).await;
    with_timeout(DEFAULT_TIMEOUT, orchestrator.start())
        .await
        .unwrap();
    let gateway = orchestrator.manager().gateway_addr("127.0.0.1:0").unwrap();
    let http = client();

    let script = http.get(url(gateway, "/ui/main.js")).send().await.unwrap();
    assert_eq!(script.status(), 200);
    assert_eq!(script.text().await.unwrap(), "boot()");

    let deep_link = http
        .get(url(gateway, "/ui/directory/objects"))
        .send()
        .await
        .unwrap();
    assert_eq!(deep_link.status(), 200);
    assert_eq!(deep_link.text().await.unwrap(), "<html>warden console</html>");

    let logo = http.get(url(gateway, "/public/logo.svg")).send().await.unwrap();
    assert_eq!(logo.status(), 200);

    let settings: Value = http
        .post(url(gateway, "/api/v1/config"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(settings["authorizerServiceUrl"], "http://127.0.0.2:0");
    assert_eq!(settings["authorizerApiKey"], "console-key");
    assert_eq!(settings["directoryTenantId"], "tenant-1");
    assert!(settings.get("writerServiceUrl").is_none());

    let authorizers: Value = http
        .get(url(gateway, "/api/v1/authorizers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        authorizers,
        json!({ "results": [{ "name": "authorizer", "url": "http://127.0.0.2:0" }] })
    );

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_console_routes_listed_before_start() {
    let dir = assets();
    let orchestrator = start(&dir, false).await;

    let infos = orchestrator.manager().server_infos();
    let console = infos
        .iter()
        .find(|info| info.services.contains(&"console".to_string()))
        .unwrap();
    assert!(console.gateway_routes.contains(&"/ui".to_string()));
    assert!(console.gateway_routes.contains(&"/public".to_string()));
    assert!(console
        .gateway_routes
        .contains(&"/api/v1/authorizers".to_string()));
}

#[tokio::test]
async fn test_console_config_withholds_api_key_by_default() {
    let dir = assets();
    let mut orchestrator = start(&dir, false).await;
    with_timeout(DEFAULT_TIMEOUT, orchestrator.start())
        .await
        .unwrap();
    let gateway = orchestrator.manager().gateway_addr("127.0.0.1:0").unwrap();
    let http = client();

    let settings: Value = http
        .get(url(gateway, "/api/v1/config"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(settings.get("authorizerApiKey").is_none());
    assert_eq!(settings["authorizerServiceUrl"], "http://127.0.0.2:0");

    // only the console bootstrap routes skip the key check
    let guarded = http
        .post(url(gateway, "/api/v3/directory/model/get_manifest"))
        .send()
        .await
        .unwrap();
    assert_eq!(guarded.status(), 401);

    orchestrator.shutdown().await;
}
