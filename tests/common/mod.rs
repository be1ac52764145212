//! Shared helpers for integration tests.
#![allow(dead_code)]

use axum::{body::Body, extract::Request, response::Response};
use portway::config::LbConfig;
use portway::proxy::RequestRouter;
use portway::registry::{
    Algorithm, Instance, InstanceStatus, RegistryGateway, RegistryStore, Service,
};
use std::sync::Arc;
use wiremock::{matchers::any, Mock, MockServer, ResponseTemplate};

pub struct Harness {
    pub store: Arc<RegistryStore>,
    pub router: RequestRouter,
}

pub fn harness() -> Harness {
    let store = Arc::new(RegistryStore::new());
    let router = RequestRouter::new(RegistryGateway::new(store.clone()), &LbConfig::default());
    Harness { store, router }
}

impl Harness {
    pub fn add_service(&self, header: &str, algorithm: Algorithm, stateful: bool) -> Service {
        let mut service = Service::new(header, header, algorithm);
        service.stateful = stateful;
        self.store.add_service(service).unwrap()
    }

    pub fn add_healthy_instance(&self, service_id: &str, addr: &str) -> Instance {
        let instance = self.store.add_instance(Instance::new(service_id, addr)).unwrap();
        self.store
            .update_instance_status(&instance.id, InstanceStatus::Healthy)
            .unwrap()
    }

    pub async fn send(&self, host: &str, headers: &[(&str, &str)]) -> Response {
        self.router
            .route(request(host, headers), Some("127.0.0.1".parse().unwrap()))
            .await
    }
}

pub fn request(host: &str, headers: &[(&str, &str)]) -> Request {
    request_with_uri(host, "/", headers)
}

pub fn request_with_uri(host: &str, uri: &str, headers: &[(&str, &str)]) -> Request {
    let mut builder = Request::builder().method("GET").uri(uri).header("host", host);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// A mock backend answering every request with the given body.
pub async fn backend(body: &str) -> MockServer {
    backend_with_status(200, body).await
}

pub async fn backend_with_status(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;
    server
}

pub fn addr_of(server: &MockServer) -> String {
    server.address().to_string()
}

/// A `host:port` with nothing listening; connections are refused.
pub fn dead_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}
