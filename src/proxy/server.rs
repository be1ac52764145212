//! Front-end listeners: the proxy port and the management API.
//!
//! Every request hitting the proxy port is funneled through the
//! [`RequestRouter`]; routing is by Host header only, so the listener is a
//! single fallback handler accepting any method and path. The management
//! API is served on its own port. Both shut down gracefully on the shared
//! broadcast signal, and the health checker stops with them.

use crate::admin;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::health::HealthChecker;
use crate::proxy::router::RequestRouter;
use crate::registry::{RegistryGateway, RegistryStore};
use axum::{
    extract::{ConnectInfo, Request, State},
    response::Response,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ProxyServer {
    config: Arc<Config>,
    store: Arc<RegistryStore>,
    router: Arc<RequestRouter>,
    health_checker: Arc<HealthChecker>,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl ProxyServer {
    pub fn new(config: Config) -> Self {
        let store = Arc::new(RegistryStore::new());
        let gateway = RegistryGateway::new(store.clone());
        let router = Arc::new(RequestRouter::new(gateway.clone(), &config.lb));
        let health_checker = Arc::new(HealthChecker::new(gateway, &config.health_check));
        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

        Self {
            config: Arc::new(config),
            store,
            router,
            health_checker,
            shutdown_tx,
        }
    }

    /// The shared registry store, for embedding and tests.
    pub fn store(&self) -> Arc<RegistryStore> {
        self.store.clone()
    }

    /// Build the proxy-port router: one fallback handler for any method
    /// and any path.
    pub fn build_proxy_router(&self) -> Router {
        Router::new()
            .fallback(proxy_request)
            .layer(TraceLayer::new_for_http())
            .with_state(self.router.clone())
    }

    /// Build the management-API router.
    pub fn build_admin_router(&self) -> Router {
        admin::router(self.store.clone()).layer(TraceLayer::new_for_http())
    }

    /// Bind both listeners, start the health checker, and serve until a
    /// shutdown signal (ctrl-c or [`ProxyServer::shutdown`]) arrives.
    pub async fn run(self) -> Result<()> {
        let proxy_addr = format!("{}:{}", self.config.lb.host, self.config.lb.port)
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("Invalid proxy address: {}", e)))?;
        let admin_addr = format!("{}:{}", self.config.api.host, self.config.api.port)
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("Invalid API address: {}", e)))?;

        let proxy_listener = tokio::net::TcpListener::bind(proxy_addr)
            .await
            .map_err(|e| Error::Server(format!("Failed to bind proxy port: {}", e)))?;
        let admin_listener = tokio::net::TcpListener::bind(admin_addr)
            .await
            .map_err(|e| Error::Server(format!("Failed to bind API port: {}", e)))?;

        info!("Proxy listening on {}", proxy_addr);
        info!("Management API listening on {}", admin_addr);

        let checker = self.health_checker.clone();
        let checker_handle = tokio::spawn(checker.start());
        info!("Health checker started");

        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(());
            }
        });

        let mut proxy_shutdown = self.shutdown_tx.subscribe();
        let mut admin_shutdown = self.shutdown_tx.subscribe();

        let proxy = axum::serve(
            proxy_listener,
            self.build_proxy_router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = proxy_shutdown.recv().await;
        });
        let admin = axum::serve(admin_listener, self.build_admin_router())
            .with_graceful_shutdown(async move {
                let _ = admin_shutdown.recv().await;
            });

        let (proxy_result, admin_result) = tokio::join!(proxy, admin);
        proxy_result.map_err(|e| Error::Server(format!("Proxy server error: {}", e)))?;
        admin_result.map_err(|e| Error::Server(format!("API server error: {}", e)))?;

        self.health_checker.stop();
        checker_handle.abort();

        info!("Servers stopped");
        Ok(())
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn proxy_request(
    State(router): State<Arc<RequestRouter>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    router.route(request, Some(peer.ip())).await
}
