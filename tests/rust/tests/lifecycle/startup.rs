//! Dependency-ordered startup and failure handling

use pretty_assertions::assert_eq;
use serde_json::json;
use tests::async_helpers::{with_timeout, DEFAULT_TIMEOUT};
use tests::fixtures::{config, service};
use tests::http::{client, url};
use tests::CountingProvider;
use warden_core::Error;
use warden_gateway::{DependenciesBuilder, Orchestrator, OrchestratorDependencies, ServingStatus};

fn chain_deps() -> (OrchestratorDependencies, std::sync::Arc<tests::Counters>) {
    let (provider, counters) = CountingProvider::new(&["store", "engine", "edge"]);
    let deps = DependenciesBuilder::new()
        .with_service("chain", provider)
        .build()
        .unwrap();
    (deps, counters)
}

#[tokio::test]
async fn test_dependencies_start_before_dependents() {
    let (deps, counters) = chain_deps();
    let cfg = config(json!({
        "api": {
            "health": { "listen_address": "127.0.0.1:0" },
            "services": {
                "store": service("127.0.0.1:0", None, &[]),
                "engine": service("127.0.0.2:0", None, &["store"]),
                "edge": service("127.0.0.3:0", None, &["engine", "store"])
            }
        }
    }));

    let mut orchestrator = Orchestrator::new(cfg, deps).await.unwrap();
    orchestrator.config_services().await.unwrap();

    let waves = orchestrator
        .manager()
        .startup_waves(&orchestrator.topology().dependencies)
        .unwrap();
    assert_eq!(
        waves,
        vec![
            vec!["127.0.0.1:0".to_string()],
            vec!["127.0.0.2:0".to_string()],
            vec!["127.0.0.3:0".to_string()],
        ]
    );

    with_timeout(DEFAULT_TIMEOUT, orchestrator.start()).await.unwrap();

    let http = client();
    for (group, name) in [
        ("127.0.0.1:0", "store"),
        ("127.0.0.2:0", "engine"),
        ("127.0.0.3:0", "edge"),
    ] {
        let addr = orchestrator.manager().protocol_addr(group).unwrap();
        let body = http
            .post(url(addr, &format!("/{}.test/ping", name)))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, name);
    }

    assert_eq!(counters.protocol(), 3);
    orchestrator.shutdown().await;
    assert_eq!(counters.cleanup(), 3);
}

#[tokio::test]
async fn test_dependency_cycle_is_rejected_at_start() {
    let (deps, _) = chain_deps();
    let cfg = config(json!({
        "api": {
            "health": { "listen_address": "127.0.0.1:0" },
            "services": {
                "store": service("127.0.0.1:0", None, &["engine"]),
                "engine": service("127.0.0.2:0", None, &["store"])
            }
        }
    }));

    let mut orchestrator = Orchestrator::new(cfg, deps).await.unwrap();
    orchestrator.config_services().await.unwrap();

    let err = orchestrator.start().await.unwrap_err();
    assert!(matches!(err, Error::Startup(_)));
    assert!(!orchestrator.is_running());
    assert!(orchestrator.manager().health_addr().is_none());
    assert_eq!(orchestrator.manager().health().get("store"), None);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_failed_bind_publishes_no_health() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let taken_addr = taken.local_addr().unwrap().to_string();

    let (deps, counters) = chain_deps();
    let cfg = config(json!({
        "api": {
            "health": { "listen_address": "127.0.0.1:0" },
            "services": {
                "store": service("127.0.0.2:0", None, &[]),
                "engine": service(&taken_addr, None, &["store"])
            }
        }
    }));

    let mut orchestrator = Orchestrator::new(cfg, deps).await.unwrap();
    orchestrator.config_services().await.unwrap();

    let err = with_timeout(DEFAULT_TIMEOUT, orchestrator.start())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Startup(_)));

    let health = orchestrator.manager().health();
    assert_eq!(health.overall(), ServingStatus::NotServing);
    assert_eq!(health.get("store"), None);
    assert_eq!(health.get("engine"), None);

    // the health server that was already up has been stopped again
    let health_addr = orchestrator.manager().health_addr().unwrap();
    assert!(client().get(url(health_addr, "/health")).send().await.is_err());

    assert!(orchestrator.start().await.is_err());
    orchestrator.shutdown().await;
    assert_eq!(counters.cleanup(), 2);
    drop(taken);
}

#[tokio::test]
async fn test_start_requires_configuration() {
    let mut orchestrator = Orchestrator::new(config(json!({ "api": {} })), Default::default())
        .await
        .unwrap();

    let err = orchestrator.start().await.unwrap_err();
    assert_eq!(err.to_string(), "startup error: services are not configured");
}
