//! Background loop that probes every instance and persists health
//! transitions.
//!
//! Each sweep enumerates all services and their instances and issues up to
//! `retries` GET requests to the instance root. Any HTTP response counts
//! as healthy, whatever the status code; only network errors and timeouts
//! count as failure. Transitions are written through the registry gateway
//! only when the computed state differs from the stored one.

use crate::config::HealthCheckConfig;
use crate::registry::{Instance, InstanceStatus, RegistryGateway};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const RETRY_PAUSE: Duration = Duration::from_secs(1);

pub struct HealthChecker {
    gateway: RegistryGateway,
    client: reqwest::Client,
    interval: Duration,
    timeout: Duration,
    retries: u32,
    shutdown: AtomicBool,
}

impl HealthChecker {
    pub fn new(gateway: RegistryGateway, config: &HealthCheckConfig) -> Self {
        Self {
            gateway,
            client: reqwest::Client::new(),
            interval: Duration::from_secs(config.interval),
            timeout: Duration::from_secs(config.timeout),
            retries: config.retries,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Run the probe loop until [`stop`](Self::stop) is called. The stop
    /// flag is checked at iteration boundaries; an in-flight sweep
    /// finishes before the loop exits.
    pub async fn start(self: Arc<Self>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.shutdown.load(Ordering::Relaxed) {
            ticker.tick().await;
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            self.check_all_instances().await;
        }

        info!("Health checker stopped");
    }

    /// Signal the loop to exit at the next iteration boundary.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Mark an instance unhealthy immediately, outside the probe cycle.
    /// Used by the request path after a forward failure.
    pub fn mark_unhealthy(&self, instance_id: &str) {
        match self
            .gateway
            .update_instance_status(instance_id, InstanceStatus::Unhealthy)
        {
            Ok(()) => warn!(instance = %instance_id, "instance marked as unhealthy"),
            Err(e) => error!(instance = %instance_id, error = %e, "error marking instance as unhealthy"),
        }
    }

    async fn check_all_instances(&self) {
        let services = match self.gateway.list_services() {
            Ok(services) => services,
            Err(e) => {
                error!(error = %e, "error enumerating services for health check");
                return;
            },
        };

        for service in services {
            let instances = match self.gateway.list_instances_for_service(&service.id) {
                Ok(instances) => instances,
                Err(e) => {
                    error!(service = %service.id, error = %e, "error enumerating instances");
                    continue;
                },
            };

            for instance in instances {
                self.check_instance(&instance).await;
            }
        }
    }

    /// Probe one instance and persist the transition if its state changed.
    pub async fn check_instance(&self, instance: &Instance) {
        let url = format!("http://{}/", instance.addr);
        let mut is_healthy = false;

        for attempt in 0..self.retries {
            match self.client.get(&url).timeout(self.timeout).send().await {
                Ok(response) => {
                    // Any response means the instance is reachable,
                    // regardless of status code.
                    debug!(
                        addr = %instance.addr,
                        status = %response.status(),
                        "health check passed"
                    );
                    is_healthy = true;
                    break;
                },
                Err(e) => {
                    warn!(addr = %instance.addr, error = %e, "health check failed");
                    if attempt + 1 < self.retries {
                        sleep(RETRY_PAUSE).await;
                    }
                },
            }
        }

        let new_status = if is_healthy {
            InstanceStatus::Healthy
        } else {
            InstanceStatus::Unhealthy
        };

        if new_status != instance.status {
            match self.gateway.update_instance_status(&instance.id, new_status) {
                Ok(()) => match new_status {
                    InstanceStatus::Unhealthy => {
                        warn!(addr = %instance.addr, "instance marked as unhealthy")
                    },
                    _ => info!(addr = %instance.addr, "instance marked as healthy"),
                },
                Err(e) => {
                    error!(addr = %instance.addr, error = %e, "error updating instance status")
                },
            }
        }
    }
}
