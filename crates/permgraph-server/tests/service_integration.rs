//! Service Integration Tests.
//!
//! End-to-end checks through the configured service: in-memory storage,
//! permission cache in both modes, and the authorizer.

use std::io::Write;
use std::time::Duration;

use permgraph_domain::model::{AccessRequest, Action, Principal, Target};
use permgraph_server::service::load_seed_file;
use permgraph_server::{AuthorizationService, ServerConfig, ServiceError};
use permgraph_storage::{EdgeStore, StoredEdge};
use tempfile::NamedTempFile;

const SCENARIO: &str = r#"[
    {"source_id": "U1", "target_id": "G1", "name": "can_manage"},
    {"source_id": "G1", "target_id": "G2", "name": "can_read"},
    {"source_id": "U1", "target_id": "vm1", "name": "can_login", "link_class": "login"}
]"#;

fn seed_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn config_with_seed(file: &NamedTempFile, mode: &str) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.cache.mode = mode.to_string();
    config.cache.poll_interval_ms = 10;
    config.cache.wait_deadline_ms = 2_000;
    config.storage.seed_file = Some(file.path().display().to_string());
    config
}

fn read(target: &str) -> AccessRequest {
    AccessRequest::new(Action::Read, Target::id(target))
}

fn write(target: &str) -> AccessRequest {
    AccessRequest::new(Action::Write, Target::id(target))
}

// ========== Section 1: Seed Loading ==========

#[test]
fn test_seed_file_defaults_link_class_and_properties() {
    let file = seed_file(SCENARIO);

    let edges = load_seed_file(file.path()).unwrap();

    assert_eq!(edges.len(), 3);
    assert_eq!(edges[0].link_class, "permission");
    assert!(edges[0].properties.is_empty());
    assert_eq!(edges[2].link_class, "login");
}

#[test]
fn test_seed_file_errors_name_the_file() {
    let missing = load_seed_file("/nonexistent/edges.json").unwrap_err();
    assert!(matches!(missing, ServiceError::SeedFileRead { .. }));
    assert!(missing.to_string().contains("/nonexistent/edges.json"));

    let file = seed_file("{ not a list");
    let malformed = load_seed_file(file.path()).unwrap_err();
    assert!(matches!(malformed, ServiceError::SeedFileParse { .. }));
}

// ========== Section 2: Synchronous Mode ==========

#[tokio::test]
async fn test_scenario_permissions_and_decisions() {
    let file = seed_file(SCENARIO);
    let service = AuthorizationService::from_config(&config_with_seed(&file, "sync"))
        .await
        .unwrap();

    let perms = service.permissions("U1").await.unwrap();
    assert!(perms.grants("G1", &Action::Manage));
    assert!(perms.grants("G2", &Action::Read));
    assert!(!perms.grants("G2", &Action::Write));
    assert!(perms.get("vm1").is_none());

    let u1 = Principal::new("U1");
    assert!(service.check(&u1, &[read("G2")]).await.unwrap());
    assert!(!service.check(&u1, &[write("G2")]).await.unwrap());

    service.shutdown().await;
}

#[tokio::test]
async fn test_edge_writes_invalidate_cached_permissions() {
    let file = seed_file(SCENARIO);
    let service = AuthorizationService::from_config(&config_with_seed(&file, "sync"))
        .await
        .unwrap();

    assert!(service.permissions("U1").await.unwrap().get("G3").is_none());

    service
        .write_edges(vec![StoredEdge::permission("G2", "G3", "can_write")], vec![])
        .await
        .unwrap();

    // Narrowed by the read-only G1 -> G2 grant.
    let perms = service.permissions("U1").await.unwrap();
    assert!(perms.grants("G3", &Action::Read));
    assert!(!perms.grants("G3", &Action::Write));

    service
        .write_edges(vec![], vec![StoredEdge::permission("G1", "G2", "can_read")])
        .await
        .unwrap();

    let perms = service.permissions("U1").await.unwrap();
    assert!(perms.get("G2").is_none());
    assert!(perms.get("G3").is_none());

    service.shutdown().await;
}

#[tokio::test]
async fn test_anonymous_group_from_config() {
    let file = seed_file(
        r#"[{"source_id": "anonymous", "target_id": "public", "name": "can_read"}]"#,
    );
    let mut config = config_with_seed(&file, "sync");
    config.authorization.anonymous_group_id = Some("anonymous".to_string());
    let service = AuthorizationService::from_config(&config).await.unwrap();

    let stranger = Principal::new("U9");
    assert!(service.check(&stranger, &[read("public")]).await.unwrap());
    assert!(!service.check(&stranger, &[write("public")]).await.unwrap());

    service.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = ServerConfig::default();
    config.cache.mode = "sometimes".to_string();

    let result = AuthorizationService::from_config(&config).await;

    assert!(matches!(result, Err(ServiceError::Config(_))));
}

// ========== Section 3: Asynchronous Mode ==========

#[tokio::test]
async fn test_async_mode_serves_and_refreshes_permissions() {
    let file = seed_file(SCENARIO);
    let service = AuthorizationService::from_config(&config_with_seed(&file, "async"))
        .await
        .unwrap();

    let perms = service.permissions("U1").await.unwrap();
    assert!(perms.grants("G2", &Action::Read));

    service
        .write_edges(vec![StoredEdge::permission("G1", "G4", "can_manage")], vec![])
        .await
        .unwrap();

    let perms = service.permissions("U1").await.unwrap();
    assert!(perms.grants("G4", &Action::Manage));

    service.shutdown().await;
}

#[tokio::test]
async fn test_async_mode_edge_written_behind_cache_is_allowed() {
    let file = seed_file(SCENARIO);
    let service = AuthorizationService::from_config(&config_with_seed(&file, "async"))
        .await
        .unwrap();
    let u1 = Principal::new("U1");

    assert!(!service.check(&u1, &[write("G5")]).await.unwrap());

    // Written directly to storage: no invalidation reaches the cache.
    service
        .storage()
        .write_edges(vec![StoredEdge::permission("G1", "G5", "can_write")], vec![])
        .await
        .unwrap();

    assert!(service.check(&u1, &[write("G5")]).await.unwrap());

    service.shutdown().await;
}

#[tokio::test]
async fn test_async_wait_deadline_is_enforced() {
    let file = seed_file(SCENARIO);
    let mut config = config_with_seed(&file, "async");
    config.cache.wait_deadline_ms = 10;
    config.cache.poll_interval_ms = 10;
    let service = AuthorizationService::from_config(&config).await.unwrap();

    // Stop the worker so nothing populates the cache.
    let cache = std::sync::Arc::clone(service.cache());
    service.shutdown().await;

    let started = std::time::Instant::now();
    let result = cache.get("U1").await;

    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(1));
}
