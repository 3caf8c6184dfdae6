//! Registry and NiFi clients against a loopback axum server

use std::collections::HashMap;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use flowsync::errors::{FlowError, RegistryError};
use flowsync::services::http::HttpSettings;
use flowsync::services::{
    ComponentKind, FlowExporter, FlowStore, NifiApi, NifiClient, RegistryApi, RegistryClient,
};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn settings(base_url: &str) -> HttpSettings {
    HttpSettings {
        base_url: base_url.to_string(),
        connect_timeout: Duration::from_secs(1),
        request_timeout: Duration::from_secs(2),
    }
}

const FLOW: &str = "/nifi-registry-api/buckets/b-1/flows/f-1";

fn registry_routes() -> Router {
    Router::new()
        .route(
            "/nifi-registry-api/buckets",
            get(|| async {
                Json(json!([
                    {"identifier": "b-1", "name": "dev", "createdTimestamp": 1700000000000_i64},
                    {"identifier": "b-2", "name": "prod", "description": "production"}
                ]))
            }),
        )
        .route(
            "/nifi-registry-api/buckets/b-1/flows",
            get(|| async { Json(json!([{"identifier": "f-1", "name": "Ingest"}])) }),
        )
        .route(
            FLOW,
            get(|| async { Json(json!({"identifier": "f-1", "name": "Ingest"})) }),
        )
        .route(
            "/nifi-registry-api/buckets/b-1/flows/f-1/versions",
            get(|| async { Json(json!([{"version": 1}, {"version": 2, "author": "ops"}])) }),
        )
        .route(
            "/nifi-registry-api/buckets/b-1/flows/f-1/versions/2",
            get(|| async { Json(json!({"flowContents": {"name": "Ingest"}})) }),
        )
        .route(
            "/nifi-registry-api/buckets/b-2/flows",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database locked") }),
        )
}

#[tokio::test]
async fn test_registry_listing_parses_identifiers() {
    let base = serve(registry_routes()).await;
    let registry = RegistryClient::new(settings(&base)).unwrap();

    let buckets = registry.list_buckets().await.unwrap();
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].id, "b-1");
    assert_eq!(buckets[1].description.as_deref(), Some("production"));

    let flows = registry.list_flows("b-1").await.unwrap();
    assert_eq!(flows[0].id, "f-1");
    assert_eq!(flows[0].bucket_id, "b-1");

    let versions = registry.list_versions("b-1", "f-1").await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[1].author.as_deref(), Some("ops"));
}

#[tokio::test]
async fn test_snapshot_falls_back_to_plain_version() {
    let base = serve(registry_routes()).await;
    let registry = RegistryClient::new(settings(&base)).unwrap();

    let snapshot = registry.get_version_snapshot("b-1", "f-1", 2).await.unwrap();
    assert_eq!(snapshot["flowContents"]["name"], "Ingest");
}

#[tokio::test]
async fn test_server_error_keeps_status_and_body() {
    let base = serve(registry_routes()).await;
    let registry = RegistryClient::new(settings(&base)).unwrap();

    let err = registry.list_flows("b-2").await.unwrap_err();
    match err {
        RegistryError::RequestFailed { status, ref body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "database locked");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_snapshot_is_not_written() {
    let app = registry_routes().route(
        "/nifi-registry-api/buckets/b-1/flows/f-1/versions/2/export",
        get(|| async { "{\"flowContents\": " }),
    );
    let base = serve(app).await;
    let registry = RegistryClient::new(settings(&base)).unwrap();
    let dir = TempDir::new().unwrap();
    let store = FlowStore::new(dir.path().join("flows"), dir.path().join("backups"));

    let err = FlowExporter::new(&registry, &store)
        .export_flow("b-1", "f-1")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FlowError::Registry(RegistryError::MalformedResponse { .. })
    ));
    assert!(!store.flows_dir().join("Ingest.json").exists());
}

#[tokio::test]
async fn test_refused_connection_is_unavailable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let registry = RegistryClient::new(settings(&format!("http://{}", addr))).unwrap();
    let err = registry.list_buckets().await.unwrap_err();
    assert!(matches!(err, RegistryError::Unavailable(_)));
    assert_eq!(err.error_code(), "REGISTRY_UNAVAILABLE");
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer tok-123")
}

fn nifi_routes() -> Router {
    Router::new()
        .route(
            "/nifi-api/access/config",
            get(|| async { Json(json!({"config": {"supportsLogin": true}})) }),
        )
        .route(
            "/nifi-api/access/token",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                if form.get("password").map(String::as_str) == Some("secret") {
                    (StatusCode::CREATED, "tok-123\n".to_string())
                } else {
                    (StatusCode::UNAUTHORIZED, "bad credentials".to_string())
                }
            }),
        )
        .route(
            "/nifi-api/flow/process-groups/root",
            get(|headers: HeaderMap| async move {
                if authorized(&headers) {
                    (StatusCode::OK, Json(json!({"processGroupFlow": {"id": "root-pg"}})))
                } else {
                    (StatusCode::UNAUTHORIZED, Json(json!({})))
                }
            }),
        )
        .route(
            "/nifi-api/process-groups/pg-1/processors",
            get(|| async { Json(json!({"processors": [{"id": "p-1"}, {"id": "p-2"}]})) })
                .post(|Json(body): Json<Value>| async move {
                    Json(json!({
                        "id": "p-new",
                        "component": body["component"],
                        "clientId": body["revision"]["clientId"],
                    }))
                }),
        )
}

#[tokio::test]
async fn test_nifi_token_is_used_for_later_calls() {
    let base = serve(nifi_routes()).await;
    let nifi = NifiClient::new(settings(&base)).unwrap();

    assert_eq!(nifi.probe().await.unwrap(), 200);
    let err = nifi.root_process_group().await.unwrap_err();
    assert_eq!(err.status(), Some(401));

    nifi.authenticate("admin", "secret").await.unwrap();
    let root = nifi.root_process_group().await.unwrap();
    assert_eq!(root["processGroupFlow"]["id"], "root-pg");
}

#[tokio::test]
async fn test_nifi_rejects_bad_credentials() {
    let base = serve(nifi_routes()).await;
    let nifi = NifiClient::new(settings(&base)).unwrap();

    let err = nifi.authenticate("admin", "wrong").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(err.is_client_error());
}

#[tokio::test]
async fn test_nifi_components_are_enveloped() {
    let base = serve(nifi_routes()).await;
    let nifi = NifiClient::new(settings(&base)).unwrap();

    let response = nifi
        .create_component("pg-1", ComponentKind::Processor, json!({"name": "LogAttribute"}))
        .await
        .unwrap();
    assert_eq!(response["component"]["name"], "LogAttribute");
    assert!(response["clientId"].as_str().is_some_and(|id| !id.is_empty()));

    let listed = nifi
        .list_components("pg-1", ComponentKind::Processor)
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
}
