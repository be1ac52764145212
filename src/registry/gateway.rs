//! Read-mostly view over the registry consumed by the router and the
//! health checker.
//!
//! The gateway narrows the store to the four operations the request path
//! needs. Every call is fallible with [`RegistryError`]: the store behind
//! it is eventually consistent and writes from the router and the health
//! checker may interleave arbitrarily (last writer wins).

use super::{Instance, InstanceStatus, RegistryError, RegistryStore, Service};
use std::sync::Arc;

#[derive(Clone)]
pub struct RegistryGateway {
    store: Arc<RegistryStore>,
}

impl RegistryGateway {
    pub fn new(store: Arc<RegistryStore>) -> Self {
        Self { store }
    }

    /// Resolve the service registered for a Host-header value.
    pub fn find_service_by_header(&self, header: &str) -> Result<Option<Service>, RegistryError> {
        Ok(self.store.find_service_by_header(header))
    }

    /// All instances of a service, regardless of status. Callers filter
    /// eligibility themselves.
    pub fn list_instances_for_service(
        &self,
        service_id: &str,
    ) -> Result<Vec<Instance>, RegistryError> {
        Ok(self.store.list_instances(service_id))
    }

    pub fn get_instance(&self, instance_id: &str) -> Result<Option<Instance>, RegistryError> {
        Ok(self.store.get_instance(instance_id))
    }

    /// Persist a health transition. Missing instances are reported so the
    /// caller can decide whether that matters on its path.
    pub fn update_instance_status(
        &self,
        instance_id: &str,
        status: InstanceStatus,
    ) -> Result<(), RegistryError> {
        self.store.update_instance_status(instance_id, status).map(|_| ())
    }

    /// Enumerate every registered service; used by the health checker sweep.
    pub fn list_services(&self) -> Result<Vec<Service>, RegistryError> {
        Ok(self.store.list_services())
    }
}
