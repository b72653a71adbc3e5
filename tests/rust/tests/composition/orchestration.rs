//! Orchestrator composition tests

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tests::fixtures::{config, service};
use tests::{CountingProvider, MockDirectoryProvider, MockDirectoryStore, MockPolicyEngine};
use warden_gateway::{DependenciesBuilder, Orchestrator};

// ============================================================================
// Grouping
// ============================================================================

#[tokio::test]
async fn test_two_services_on_one_endpoint_compose_one_server() {
    let (alpha, alpha_count) = CountingProvider::new(&["alpha"]);
    let (beta, beta_count) = CountingProvider::new(&["beta"]);
    let deps = DependenciesBuilder::new()
        .with_service("alpha", alpha)
        .with_service("beta", beta)
        .build()
        .unwrap();

    let cfg = config(json!({
        "api": {
            "services": {
                "alpha": service("127.0.0.1:0", None, &[]),
                "beta": service("127.0.0.1:0", None, &[])
            }
        }
    }));

    let mut orchestrator = Orchestrator::new(cfg, deps).await.unwrap();
    orchestrator.config_services().await.unwrap();

    let servers = orchestrator.manager().servers();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].services(), &["alpha".to_string(), "beta".to_string()]);
    assert_eq!(
        servers[0].protocol().routes().collect::<Vec<_>>(),
        vec!["/alpha.test/ping", "/beta.test/ping"]
    );
    assert_eq!(alpha_count.protocol(), 1);
    assert_eq!(beta_count.protocol(), 1);
    assert!(orchestrator.topology().dependencies.is_empty());
}

#[tokio::test]
async fn test_overlapping_capability_uses_first_provider() {
    let (first, first_count) = CountingProvider::new(&["foo"]);
    let (second, second_count) = CountingProvider::new(&["foo"]);
    let deps = DependenciesBuilder::new()
        .with_service("first", first)
        .with_service("second", second)
        .build()
        .unwrap();

    let cfg = config(json!({
        "api": { "services": { "foo": service("127.0.0.1:0", Some("127.0.0.1:0"), &[]) } }
    }));

    let mut orchestrator = Orchestrator::new(cfg, deps).await.unwrap();
    orchestrator.config_services().await.unwrap();

    assert_eq!(orchestrator.registry().owner_of("foo"), Some("first"));
    assert_eq!(first_count.protocol(), 1);
    assert_eq!(first_count.gateway(), 1);
    assert_eq!(second_count.protocol(), 0);
    assert_eq!(second_count.gateway(), 0);
}

#[tokio::test]
async fn test_services_on_distinct_endpoints_compose_separately() {
    let (alpha, _) = CountingProvider::new(&["alpha", "beta"]);
    let deps = DependenciesBuilder::new()
        .with_service("both", alpha)
        .build()
        .unwrap();

    let cfg = config(json!({
        "api": {
            "services": {
                "alpha": service("127.0.0.1:0", None, &[]),
                "beta": service("127.0.0.2:0", None, &["alpha"])
            }
        }
    }));

    let mut orchestrator = Orchestrator::new(cfg, deps).await.unwrap();
    orchestrator.config_services().await.unwrap();

    let topology = orchestrator.topology();
    assert_eq!(topology.groups.len(), 2);
    assert_eq!(
        topology.dependencies.dependencies_of("127.0.0.2:0"),
        &["127.0.0.1:0".to_string()]
    );
    assert_eq!(
        orchestrator
            .manager()
            .startup_waves(&topology.dependencies)
            .unwrap(),
        vec![vec!["127.0.0.1:0".to_string()], vec!["127.0.0.2:0".to_string()]]
    );
}

// ============================================================================
// Built-in providers
// ============================================================================

#[tokio::test]
async fn test_builtin_providers_register_in_order() {
    let store = Arc::new(MockDirectoryStore::new());
    let provider = Arc::new(MockDirectoryProvider::new(store));
    let deps = DependenciesBuilder::new()
        .with_policy_engine(Arc::new(MockPolicyEngine::new()))
        .with_directory_provider(provider.clone())
        .build()
        .unwrap();

    let cfg = config(json!({
        "api": {
            "services": {
                "reader": service("127.0.0.1:0", Some("127.0.0.1:0"), &[]),
                "writer": service("127.0.0.1:0", None, &[]),
                "model": service("127.0.0.1:0", Some("127.0.0.1:0"), &[]),
                "authorizer": service("127.0.0.2:0", Some("127.0.0.2:0"), &["reader"]),
                "console": service("127.0.0.3:0", Some("127.0.0.3:0"), &[])
            }
        },
        "edge": { "db_path": "/tmp/warden-directory.db" },
        "directory_resolver": { "address": "127.0.0.1:0" }
    }));

    let mut orchestrator = Orchestrator::new(cfg, deps).await.unwrap();
    orchestrator.config_services().await.unwrap();

    assert_eq!(provider.opened(), 1);
    let keys: Vec<&str> = orchestrator.registry().providers().map(|(key, _)| key).collect();
    assert_eq!(keys, vec!["directory", "authorizer", "console"]);

    let infos = orchestrator.manager().server_infos();
    assert_eq!(infos.len(), 3);
    let directory = infos.iter().find(|i| i.address == "127.0.0.1:0").unwrap();
    assert!(directory
        .protocol_routes
        .contains(&"/reader.v3/{method}".to_string()));
    assert!(directory
        .gateway_routes
        .contains(&"/api/v3/directory/writer/{method}".to_string()));

    let console = infos.iter().find(|i| i.address == "127.0.0.3:0").unwrap();
    assert!(console.gateway_routes.contains(&"/api/v1/config".to_string()));
}

#[tokio::test]
async fn test_edge_without_directory_provider_fails() {
    let cfg = config(json!({
        "api": { "services": {} },
        "edge": { "db_path": "/tmp/warden-directory.db" }
    }));

    let mut orchestrator = Orchestrator::new(cfg, Default::default()).await.unwrap();
    let err = orchestrator.config_services().await.unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_directory_open_failure_is_configuration_error() {
    let deps = DependenciesBuilder::new()
        .with_directory_provider(Arc::new(MockDirectoryProvider::failing()))
        .build()
        .unwrap();
    let cfg = config(json!({
        "api": { "services": {} },
        "edge": { "db_path": "/tmp/warden-directory.db" }
    }));

    let mut orchestrator = Orchestrator::new(cfg, deps).await.unwrap();
    let err = orchestrator.config_services().await.unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("cannot open /tmp/warden-directory.db"));
}
