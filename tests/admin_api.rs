//! Management API CRUD flows.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use portway::registry::RegistryStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn api() -> (Router, Arc<RegistryStore>) {
    let store = Arc::new(RegistryStore::new());
    (portway::admin::router(store.clone()), store)
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder().method(method).uri(uri).body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn service_crud_round_trip() {
    let (router, _store) = api();

    let (status, created) = send(
        &router,
        "POST",
        "/services/",
        Some(json!({
            "name": "orders",
            "header": "orders.example.com",
            "algorithm": "round_robin",
            "stateful": false
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let service_id = created["id"].as_str().unwrap().to_string();

    let (status, fetched) = send(&router, "GET", &format!("/services/{}", service_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["header"], "orders.example.com");

    let (status, by_header) =
        send(&router, "GET", "/services/header/orders.example.com", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_header["id"], created["id"]);

    let (status, updated) = send(
        &router,
        "PUT",
        &format!("/services/{}", service_id),
        Some(json!({"stateful": true, "algorithm": "ip_hash"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["stateful"], true);
    assert_eq!(updated["algorithm"], "ip_hash");

    let (status, _) = send(&router, "DELETE", &format!("/services/{}", service_id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, "GET", &format!("/services/{}", service_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_service_header_is_a_409() {
    let (router, _store) = api();

    let payload = json!({"name": "a", "header": "dup.example.com"});
    let (status, _) = send(&router, "POST", "/services/", Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &router,
        "POST",
        "/services/",
        Some(json!({"name": "b", "header": "dup.example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("header"));
}

#[tokio::test]
async fn unknown_algorithm_tag_is_rejected() {
    let (router, _store) = api();

    let (status, body) = send(
        &router,
        "POST",
        "/services/",
        Some(json!({"name": "a", "header": "a.example.com", "algorithm": "fastest_first"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid input"));
}

#[tokio::test]
async fn missing_host_header_lookup_is_a_404() {
    let (router, _store) = api();
    let (status, body) = send(&router, "GET", "/services/header/ghost.example.com", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn instance_lifecycle_under_a_service() {
    let (router, store) = api();

    let (_, service) = send(
        &router,
        "POST",
        "/services/",
        Some(json!({"name": "orders", "header": "orders.example.com"})),
    )
    .await;
    let service_id = service["id"].as_str().unwrap().to_string();

    let (status, instance) = send(
        &router,
        "POST",
        &format!("/services/{}/instances/", service_id),
        Some(json!({"addr": "10.0.0.1:9000", "weight": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(instance["status"], "unknown");
    assert_eq!(instance["weight"], 3);
    let instance_id = instance["id"].as_str().unwrap().to_string();

    // Duplicate addr within the service conflicts.
    let (status, _) = send(
        &router,
        "POST",
        &format!("/services/{}/instances/", service_id),
        Some(json!({"addr": "10.0.0.1:9000"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, listed) = send(
        &router,
        "GET",
        &format!("/services/{}/instances/", service_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, updated) = send(
        &router,
        "PUT",
        &format!("/services/{}/instances/{}/status", service_id, instance_id),
        Some(json!({"status": "healthy"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "healthy");
    assert_eq!(
        store.get_instance(&instance_id).unwrap().status,
        portway::registry::InstanceStatus::Healthy
    );

    let (status, _) = send(
        &router,
        "DELETE",
        &format!("/services/{}/instances/{}", service_id, instance_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(store.get_instance(&instance_id).is_none());
}

#[tokio::test]
async fn instance_payload_requires_addr() {
    let (router, _store) = api();

    let (_, service) = send(
        &router,
        "POST",
        "/services/",
        Some(json!({"name": "a", "header": "a.example.com"})),
    )
    .await;
    let service_id = service["id"].as_str().unwrap();

    let (status, body) = send(
        &router,
        "POST",
        &format!("/services/{}/instances/", service_id),
        Some(json!({"weight": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required field: 'addr'");
}

#[tokio::test]
async fn instance_creation_requires_an_existing_service() {
    let (router, _store) = api();
    let (status, _) = send(
        &router,
        "POST",
        "/services/ghost/instances/",
        Some(json!({"addr": "10.0.0.1:9000"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_status_value_is_a_400() {
    let (router, _store) = api();

    let (_, service) = send(
        &router,
        "POST",
        "/services/",
        Some(json!({"name": "a", "header": "a.example.com"})),
    )
    .await;
    let service_id = service["id"].as_str().unwrap().to_string();
    let (_, instance) = send(
        &router,
        "POST",
        &format!("/services/{}/instances/", service_id),
        Some(json!({"addr": "10.0.0.1:9000"})),
    )
    .await;
    let instance_id = instance["id"].as_str().unwrap();

    let (status, body) = send(
        &router,
        "PUT",
        &format!("/services/{}/instances/{}/status", service_id, instance_id),
        Some(json!({"status": "on_fire"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid status"));

    let (status, body) = send(
        &router,
        "PUT",
        &format!("/services/{}/instances/{}/status", service_id, instance_id),
        Some(json!({"state": "healthy"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("'status' field required"));
}

#[tokio::test]
async fn instance_lookups_are_scoped_to_their_service() {
    let (router, _store) = api();

    let (_, svc_a) = send(
        &router,
        "POST",
        "/services/",
        Some(json!({"name": "a", "header": "a.example.com"})),
    )
    .await;
    let (_, svc_b) = send(
        &router,
        "POST",
        "/services/",
        Some(json!({"name": "b", "header": "b.example.com"})),
    )
    .await;

    let (_, instance) = send(
        &router,
        "POST",
        &format!("/services/{}/instances/", svc_a["id"].as_str().unwrap()),
        Some(json!({"addr": "10.0.0.1:9000"})),
    )
    .await;

    let (status, body) = send(
        &router,
        "GET",
        &format!(
            "/services/{}/instances/{}",
            svc_b["id"].as_str().unwrap(),
            instance["id"].as_str().unwrap()
        ),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Instance not found within this service");
}

#[tokio::test]
async fn deleting_a_service_cascades_to_its_instances() {
    let (router, store) = api();

    let (_, service) = send(
        &router,
        "POST",
        "/services/",
        Some(json!({"name": "a", "header": "a.example.com"})),
    )
    .await;
    let service_id = service["id"].as_str().unwrap().to_string();

    let (_, instance) = send(
        &router,
        "POST",
        &format!("/services/{}/instances/", service_id),
        Some(json!({"addr": "10.0.0.1:9000"})),
    )
    .await;
    let instance_id = instance["id"].as_str().unwrap().to_string();

    let (status, _) = send(&router, "DELETE", &format!("/services/{}", service_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(store.get_instance(&instance_id).is_none());
}
