//! Request orchestration: resolve the service, pick an instance, forward,
//! and retry on failure.
//!
//! The router is the only component that sees a request end to end. It
//! resolves the service from the Host header, filters the instance set to
//! healthy members, runs sticky-session and algorithm selection, and
//! drives the retry loop: a failed forward quarantines the instance
//! (best-effort status write), shrinks the working set, and tries again
//! until the set is exhausted.

use crate::config::LbConfig;
use crate::error::RouteError;
use crate::proxy::forwarder::Forwarder;
use crate::registry::{Instance, InstanceStatus, RegistryGateway, Service};
use crate::routing::{AlgorithmSet, StickySessionManager};
use axum::{
    extract::Request,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct RequestRouter {
    gateway: RegistryGateway,
    algorithms: AlgorithmSet,
    sticky: StickySessionManager,
    forwarder: Forwarder,
}

impl RequestRouter {
    pub fn new(gateway: RegistryGateway, config: &LbConfig) -> Self {
        Self {
            gateway,
            algorithms: AlgorithmSet::new(),
            sticky: StickySessionManager::new(
                Duration::from_secs(config.sticky.ttl),
                Duration::from_secs(config.sticky.cleanup_interval),
            ),
            forwarder: Forwarder::new(Duration::from_secs(config.timeout)),
        }
    }

    /// Route one incoming request to a backend instance and return the
    /// response to stream back. Never panics the connection: every error
    /// becomes a plain-text HTTP error response.
    pub async fn route(&self, request: Request, peer_ip: Option<IpAddr>) -> Response {
        match self.try_route(request, peer_ip).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }

    async fn try_route(
        &self,
        request: Request,
        peer_ip: Option<IpAddr>,
    ) -> Result<Response, RouteError> {
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .filter(|h| !h.is_empty())
            .map(str::to_owned)
            .ok_or(RouteError::MissingHostHeader)?;

        let service = self
            .gateway
            .find_service_by_header(&host)?
            .ok_or_else(|| RouteError::ServiceNotFound(host.clone()))?;

        let instances: Vec<Instance> = self
            .gateway
            .list_instances_for_service(&service.id)?
            .into_iter()
            .filter(|i| i.status == InstanceStatus::Healthy)
            .collect();
        if instances.is_empty() {
            return Err(RouteError::NoHealthyInstances);
        }

        let client_ip = client_ip(request.headers(), peer_ip);

        let (parts, body) = request.into_parts();
        // Buffer the body once so retries can resend it.
        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| RouteError::Internal(format!("Failed to read request body: {}", e)))?;
        let path = parts.uri.path().to_owned();
        let query = parts.uri.query().map(str::to_owned);

        self.route_with_retries(
            &service, instances, &client_ip, peer_ip, &parts.method, &parts.headers, query, body,
            &path,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn route_with_retries(
        &self,
        service: &Service,
        instances: Vec<Instance>,
        client_ip: &str,
        peer_ip: Option<IpAddr>,
        method: &axum::http::Method,
        headers: &HeaderMap,
        query: Option<String>,
        body: bytes::Bytes,
        path: &str,
    ) -> Result<Response, RouteError> {
        let mut working = instances;
        let mut tried: HashSet<String> = HashSet::new();
        let mut last_error: Option<String> = None;

        while !working.is_empty() {
            let (instance, counted) = self.select_instance(service, &working, client_ip)?;

            // Deterministic algorithms re-propose the same instance once
            // the set stops changing; a repeat means nothing new to try.
            if tried.contains(&instance.id) {
                if counted {
                    self.algorithms.release(service.algorithm, &instance.id);
                }
                break;
            }

            let forwarded = self
                .forwarder
                .forward(
                    method.clone(),
                    headers,
                    query.as_deref(),
                    body.clone(),
                    peer_ip,
                    &instance,
                    path,
                )
                .await;

            // Pair every counted selection with exactly one release, on
            // success and failure alike, so connection counts stay bounded.
            if counted {
                self.algorithms.release(service.algorithm, &instance.id);
            }

            match forwarded {
                Ok(response) => {
                    if service.stateful && response.status().as_u16() < 500 {
                        self.sticky.remember(client_ip, &service.id, &instance.id);
                    }
                    return Ok(response);
                },
                Err(err) => {
                    warn!(
                        instance = %instance.id,
                        addr = %instance.addr,
                        error = %err,
                        "request to instance failed"
                    );

                    if service.stateful {
                        self.sticky.forget(client_ip, &service.id);
                    }

                    // Best-effort quarantine; the request path must not
                    // fail because the transition could not be recorded.
                    match self
                        .gateway
                        .update_instance_status(&instance.id, InstanceStatus::Unhealthy)
                    {
                        Ok(()) => info!(instance = %instance.id, "marked instance as unhealthy"),
                        Err(db_err) => {
                            error!(instance = %instance.id, error = %db_err, "failed to update instance status")
                        },
                    }

                    last_error = Some(err.to_string());
                    tried.insert(instance.id.clone());
                    working.retain(|i| i.id != instance.id);

                    if working.is_empty() {
                        error!("no more instances available for retry");
                    } else {
                        info!(remaining = working.len(), "retrying with remaining instances");
                    }
                },
            }
        }

        Err(RouteError::AllInstancesFailed(last_error))
    }

    /// Pick the next instance to try. Returns the instance and whether the
    /// selection went through the algorithm (and therefore incremented a
    /// least-connection count the caller must release).
    fn select_instance(
        &self,
        service: &Service,
        working: &[Instance],
        client_ip: &str,
    ) -> Result<(Instance, bool), RouteError> {
        if service.stateful {
            if let Some(instance_id) = self.sticky.lookup(client_ip, &service.id) {
                if let Some(instance) = working.iter().find(|i| i.id == instance_id) {
                    return Ok((instance.clone(), false));
                }
                // The pinned instance is gone or ineligible; drop the
                // mapping and fall through to the algorithm.
                self.sticky.forget(client_ip, &service.id);
            }
        }

        let instance = self.algorithms.select(service.algorithm, working, client_ip)?;
        let counted = service.algorithm == crate::registry::Algorithm::LeastConnection;
        Ok((instance, counted))
    }
}

/// The client's IP for selection purposes: first hop of X-Forwarded-For,
/// then X-Real-IP, then the socket peer.
fn client_ip(headers: &HeaderMap, peer_ip: Option<IpAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        })
        .or_else(|| peer_ip.map(|ip| ip.to_string()))
        .unwrap_or_else(|| "0.0.0.0".to_string())
}
