//! Management REST API for the service/instance registry.
//!
//! A thin CRUD layer over the registry store. All errors are JSON
//! envelopes of the form `{"error": "..."}`; uniqueness violations map to
//! 409, missing records to 404, malformed payloads to 400.

use crate::registry::{
    Instance, InstanceStatus, RegistryError, RegistryStore, Service, ServiceUpdate,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

type ApiResponse = (StatusCode, Json<Value>);

/// Build the management router.
pub fn router(store: Arc<RegistryStore>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/services/", post(create_service).get(list_services))
        .route(
            "/services/:service_id",
            get(get_service).put(update_service).delete(delete_service),
        )
        .route("/services/header/:header", get(get_service_by_header))
        .route(
            "/services/:service_id/instances/",
            post(create_instance).get(list_instances),
        )
        .route(
            "/services/:service_id/instances/:instance_id",
            get(get_instance).delete(delete_instance),
        )
        .route(
            "/services/:service_id/instances/:instance_id/status",
            put(update_instance_status),
        )
        .with_state(store)
}

async fn index() -> &'static str {
    "Load balancer API is running."
}

// --- Service endpoints ---

async fn create_service(
    State(store): State<Arc<RegistryStore>>,
    Json(payload): Json<Value>,
) -> ApiResponse {
    let service: Service = match serde_json::from_value(payload) {
        Ok(service) => service,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid input: {}", e)),
    };

    match store.add_service(service) {
        Ok(created) => (StatusCode::CREATED, Json(json!(created))),
        Err(e) => registry_error_response(e),
    }
}

async fn list_services(State(store): State<Arc<RegistryStore>>) -> ApiResponse {
    (StatusCode::OK, Json(json!(store.list_services())))
}

async fn get_service(
    State(store): State<Arc<RegistryStore>>,
    Path(service_id): Path<String>,
) -> ApiResponse {
    match store.get_service(&service_id) {
        Some(service) => (StatusCode::OK, Json(json!(service))),
        None => error_response(StatusCode::NOT_FOUND, "Service not found"),
    }
}

async fn get_service_by_header(
    State(store): State<Arc<RegistryStore>>,
    Path(header): Path<String>,
) -> ApiResponse {
    match store.find_service_by_header(&header) {
        Some(service) => (StatusCode::OK, Json(json!(service))),
        None => error_response(StatusCode::NOT_FOUND, "Service not found for this header"),
    }
}

async fn update_service(
    State(store): State<Arc<RegistryStore>>,
    Path(service_id): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResponse {
    let update: ServiceUpdate = match serde_json::from_value(payload) {
        Ok(update) => update,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid input: {}", e)),
    };

    if update.name.is_none()
        && update.header.is_none()
        && update.algorithm.is_none()
        && update.stateful.is_none()
    {
        return error_response(
            StatusCode::BAD_REQUEST,
            "No valid fields provided for update",
        );
    }

    match store.update_service(&service_id, update) {
        Ok(updated) => (StatusCode::OK, Json(json!(updated))),
        Err(e) => registry_error_response(e),
    }
}

async fn delete_service(
    State(store): State<Arc<RegistryStore>>,
    Path(service_id): Path<String>,
) -> ApiResponse {
    match store.delete_service(&service_id) {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({"message": "Service deleted successfully"})),
        ),
        Err(e) => registry_error_response(e),
    }
}

// --- Instance endpoints ---

#[derive(Deserialize)]
struct NewInstance {
    addr: String,
    weight: Option<u32>,
}

async fn create_instance(
    State(store): State<Arc<RegistryStore>>,
    Path(service_id): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResponse {
    if store.get_service(&service_id).is_none() {
        return error_response(StatusCode::NOT_FOUND, "Service not found");
    }

    if payload.get("addr").and_then(Value::as_str).is_none() {
        return error_response(StatusCode::BAD_REQUEST, "Missing required field: 'addr'");
    }

    let new_instance: NewInstance = match serde_json::from_value(payload) {
        Ok(new_instance) => new_instance,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid input: {}", e)),
    };

    let mut instance = Instance::new(service_id, new_instance.addr);
    if let Some(weight) = new_instance.weight {
        instance.weight = weight;
    }

    match store.add_instance(instance) {
        Ok(created) => (StatusCode::CREATED, Json(json!(created))),
        Err(e) => registry_error_response(e),
    }
}

async fn list_instances(
    State(store): State<Arc<RegistryStore>>,
    Path(service_id): Path<String>,
) -> ApiResponse {
    if store.get_service(&service_id).is_none() {
        return error_response(StatusCode::NOT_FOUND, "Service not found");
    }

    (StatusCode::OK, Json(json!(store.list_instances(&service_id))))
}

async fn get_instance(
    State(store): State<Arc<RegistryStore>>,
    Path((service_id, instance_id)): Path<(String, String)>,
) -> ApiResponse {
    match find_in_service(&store, &service_id, &instance_id) {
        Ok(instance) => (StatusCode::OK, Json(json!(instance))),
        Err(response) => response,
    }
}

async fn delete_instance(
    State(store): State<Arc<RegistryStore>>,
    Path((service_id, instance_id)): Path<(String, String)>,
) -> ApiResponse {
    if let Err(response) = find_in_service(&store, &service_id, &instance_id) {
        return response;
    }

    match store.delete_instance(&instance_id) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"message": "Instance deleted successfully"})),
        ),
        Err(e) => registry_error_response(e),
    }
}

#[derive(Deserialize)]
struct StatusUpdate {
    status: InstanceStatus,
}

async fn update_instance_status(
    State(store): State<Arc<RegistryStore>>,
    Path((service_id, instance_id)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> ApiResponse {
    if payload.get("status").is_none() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid input, 'status' field required",
        );
    }

    let update: StatusUpdate = match serde_json::from_value(payload) {
        Ok(update) => update,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Invalid status. Valid statuses are: healthy, unhealthy, unknown",
            )
        },
    };

    if let Err(response) = find_in_service(&store, &service_id, &instance_id) {
        return response;
    }

    match store.update_instance_status(&instance_id, update.status) {
        Ok(updated) => (StatusCode::OK, Json(json!(updated))),
        Err(e) => registry_error_response(e),
    }
}

/// Look up an instance and verify it belongs to the service in the path.
fn find_in_service(
    store: &RegistryStore,
    service_id: &str,
    instance_id: &str,
) -> Result<Instance, ApiResponse> {
    match store.get_instance(instance_id) {
        Some(instance) if instance.service_id == service_id => Ok(instance),
        Some(_) => Err(error_response(
            StatusCode::NOT_FOUND,
            "Instance not found within this service",
        )),
        None => Err(error_response(StatusCode::NOT_FOUND, "Instance not found")),
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiResponse {
    (status, Json(json!({"error": message.into()})))
}

fn registry_error_response(err: RegistryError) -> ApiResponse {
    match err {
        RegistryError::DuplicateService(_) | RegistryError::DuplicateInstance(_) => {
            error_response(StatusCode::CONFLICT, err.to_string())
        },
        RegistryError::ServiceNotFound | RegistryError::InstanceNotFound => {
            error_response(StatusCode::NOT_FOUND, err.to_string())
        },
        RegistryError::Unavailable(_) => {
            error!(error = %err, "registry operation failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Database operation failed")
        },
    }
}
