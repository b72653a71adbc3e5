//! Topology validation through the orchestrator

use std::sync::Arc;

use serde_json::json;
use tests::fixtures::{config, service};
use tests::{MockDirectoryProvider, MockDirectoryStore};
use warden_core::Error;
use warden_gateway::{DependenciesBuilder, Orchestrator, OrchestratorDependencies};

fn directory_deps() -> OrchestratorDependencies {
    DependenciesBuilder::new()
        .with_directory_provider(Arc::new(MockDirectoryProvider::new(Arc::new(
            MockDirectoryStore::new(),
        ))))
        .build()
        .unwrap()
}

async fn configure(cfg: serde_json::Value, deps: OrchestratorDependencies) -> Result<(), Error> {
    let mut orchestrator = Orchestrator::new(config(cfg), deps).await?;
    orchestrator.config_services().await
}

#[tokio::test]
async fn test_reader_on_other_address_than_resolver_is_rejected() {
    let err = configure(
        json!({
            "api": {
                "services": {
                    "reader": service(":9292", None, &[]),
                    "model": service(":9292", None, &[])
                }
            },
            "edge": { "db_path": "/tmp/warden-directory.db" },
            "directory_resolver": { "address": ":9393" }
        }),
        directory_deps(),
    )
    .await
    .unwrap_err();

    assert_eq!(
        err.to_string(),
        "configuration error: remote directory resolver address is different from reader grpc address"
    );
}

#[tokio::test]
async fn test_console_without_model_is_rejected() {
    let err = configure(
        json!({
            "api": { "services": { "console": service("127.0.0.1:0", Some("127.0.0.1:0"), &[]) } }
        }),
        OrchestratorDependencies::default(),
    )
    .await
    .unwrap_err();

    assert_eq!(
        err.to_string(),
        "configuration error: console needs the model service to be configured"
    );
}

#[tokio::test]
async fn test_console_with_model_is_accepted() {
    configure(
        json!({
            "api": {
                "services": {
                    "console": service("127.0.0.1:0", Some("127.0.0.1:0"), &[]),
                    "model": service("127.0.0.2:0", None, &[])
                }
            },
            "edge": { "db_path": "/tmp/warden-directory.db" }
        }),
        directory_deps(),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_unknown_service_type_is_rejected() {
    let err = configure(
        json!({
            "api": { "services": { "billing": service("127.0.0.1:0", None, &[]) } }
        }),
        OrchestratorDependencies::default(),
    )
    .await
    .unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(
        err.to_string(),
        "configuration error: unknown service type billing"
    );
}

#[tokio::test]
async fn test_unresolved_needs_are_tolerated() {
    configure(
        json!({
            "api": {
                "services": {
                    "model": service("127.0.0.1:0", None, &["ghost"])
                }
            },
            "edge": { "db_path": "/tmp/warden-directory.db" }
        }),
        directory_deps(),
    )
    .await
    .unwrap();
}
