//! In-process document store backing the registry.
//!
//! Two collections behind one lock, with the unique indexes enforced at
//! every insert and update. Records are kept in insertion order, so
//! instance listings are stable; round-robin tie-breaking depends on that.
//! Writers take the lock exclusively; the read path clones records out so
//! no caller holds the lock across I/O.

use super::{Instance, InstanceStatus, RegistryError, Service, ServiceUpdate};
use parking_lot::RwLock;

#[derive(Default)]
struct Collections {
    services: Vec<Service>,
    instances: Vec<Instance>,
}

/// Thread-safe registry of services and their instances.
#[derive(Default)]
pub struct RegistryStore {
    inner: RwLock<Collections>,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Service operations ---

    /// Insert a new service, enforcing the unique `name` and `header` indexes.
    pub fn add_service(&self, service: Service) -> Result<Service, RegistryError> {
        let mut inner = self.inner.write();

        if inner.services.iter().any(|s| s.name == service.name) {
            return Err(RegistryError::DuplicateService("name"));
        }
        if inner.services.iter().any(|s| s.header == service.header) {
            return Err(RegistryError::DuplicateService("header"));
        }

        inner.services.push(service.clone());
        Ok(service)
    }

    pub fn get_service(&self, service_id: &str) -> Option<Service> {
        self.inner.read().services.iter().find(|s| s.id == service_id).cloned()
    }

    pub fn find_service_by_header(&self, header: &str) -> Option<Service> {
        self.inner.read().services.iter().find(|s| s.header == header).cloned()
    }

    pub fn list_services(&self) -> Vec<Service> {
        self.inner.read().services.clone()
    }

    /// Apply a partial update, re-checking uniqueness against other services.
    pub fn update_service(
        &self,
        service_id: &str,
        update: ServiceUpdate,
    ) -> Result<Service, RegistryError> {
        let mut inner = self.inner.write();

        if !inner.services.iter().any(|s| s.id == service_id) {
            return Err(RegistryError::ServiceNotFound);
        }

        if let Some(name) = &update.name {
            if inner.services.iter().any(|s| s.id != service_id && s.name == *name) {
                return Err(RegistryError::DuplicateService("name"));
            }
        }
        if let Some(header) = &update.header {
            if inner.services.iter().any(|s| s.id != service_id && s.header == *header) {
                return Err(RegistryError::DuplicateService("header"));
            }
        }

        let service = match inner.services.iter_mut().find(|s| s.id == service_id) {
            Some(service) => service,
            None => return Err(RegistryError::ServiceNotFound),
        };
        if let Some(name) = update.name {
            service.name = name;
        }
        if let Some(header) = update.header {
            service.header = header;
        }
        if let Some(algorithm) = update.algorithm {
            service.algorithm = algorithm;
        }
        if let Some(stateful) = update.stateful {
            service.stateful = stateful;
        }

        Ok(service.clone())
    }

    /// Delete a service and cascade to its instances. Returns the number of
    /// instances removed alongside.
    pub fn delete_service(&self, service_id: &str) -> Result<usize, RegistryError> {
        let mut inner = self.inner.write();

        let before = inner.services.len();
        inner.services.retain(|s| s.id != service_id);
        if inner.services.len() == before {
            return Err(RegistryError::ServiceNotFound);
        }

        let before = inner.instances.len();
        inner.instances.retain(|i| i.service_id != service_id);
        Ok(before - inner.instances.len())
    }

    // --- Instance operations ---

    /// Insert a new instance, enforcing the `(service_id, addr)` index.
    pub fn add_instance(&self, instance: Instance) -> Result<Instance, RegistryError> {
        let mut inner = self.inner.write();

        if !inner.services.iter().any(|s| s.id == instance.service_id) {
            return Err(RegistryError::ServiceNotFound);
        }
        if inner
            .instances
            .iter()
            .any(|i| i.service_id == instance.service_id && i.addr == instance.addr)
        {
            return Err(RegistryError::DuplicateInstance(instance.addr));
        }

        inner.instances.push(instance.clone());
        Ok(instance)
    }

    pub fn get_instance(&self, instance_id: &str) -> Option<Instance> {
        self.inner.read().instances.iter().find(|i| i.id == instance_id).cloned()
    }

    /// All instances of a service, in registration order.
    pub fn list_instances(&self, service_id: &str) -> Vec<Instance> {
        self.inner
            .read()
            .instances
            .iter()
            .filter(|i| i.service_id == service_id)
            .cloned()
            .collect()
    }

    pub fn update_instance_status(
        &self,
        instance_id: &str,
        status: InstanceStatus,
    ) -> Result<Instance, RegistryError> {
        let mut inner = self.inner.write();
        let instance = inner
            .instances
            .iter_mut()
            .find(|i| i.id == instance_id)
            .ok_or(RegistryError::InstanceNotFound)?;
        instance.status = status;
        Ok(instance.clone())
    }

    pub fn delete_instance(&self, instance_id: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        let before = inner.instances.len();
        inner.instances.retain(|i| i.id != instance_id);
        if inner.instances.len() == before {
            return Err(RegistryError::InstanceNotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Algorithm;

    fn service(name: &str, header: &str) -> Service {
        Service::new(name, header, Algorithm::RoundRobin)
    }

    #[test]
    fn duplicate_name_and_header_are_rejected() {
        let store = RegistryStore::new();
        store.add_service(service("api", "api.example.com")).unwrap();

        let err = store.add_service(service("api", "other.example.com")).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateService("name")));

        let err = store.add_service(service("api2", "api.example.com")).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateService("header")));
    }

    #[test]
    fn duplicate_addr_is_scoped_to_the_service() {
        let store = RegistryStore::new();
        let a = store.add_service(service("a", "a.example.com")).unwrap();
        let b = store.add_service(service("b", "b.example.com")).unwrap();

        store.add_instance(Instance::new(&a.id, "10.0.0.1:9000")).unwrap();
        let err = store
            .add_instance(Instance::new(&a.id, "10.0.0.1:9000"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateInstance(_)));

        // Same addr under a different service is fine.
        store.add_instance(Instance::new(&b.id, "10.0.0.1:9000")).unwrap();
    }

    #[test]
    fn instance_requires_existing_service() {
        let store = RegistryStore::new();
        let err = store
            .add_instance(Instance::new("ghost", "10.0.0.1:9000"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::ServiceNotFound));
    }

    #[test]
    fn instances_are_listed_in_registration_order() {
        let store = RegistryStore::new();
        let svc = store.add_service(service("a", "a.example.com")).unwrap();
        for addr in ["10.0.0.1:9000", "10.0.0.2:9000", "10.0.0.3:9000"] {
            store.add_instance(Instance::new(&svc.id, addr)).unwrap();
        }

        let addrs: Vec<String> =
            store.list_instances(&svc.id).into_iter().map(|i| i.addr).collect();
        assert_eq!(addrs, ["10.0.0.1:9000", "10.0.0.2:9000", "10.0.0.3:9000"]);
    }

    #[test]
    fn status_update_round_trips() {
        let store = RegistryStore::new();
        let svc = store.add_service(service("a", "a.example.com")).unwrap();
        let inst = store.add_instance(Instance::new(&svc.id, "10.0.0.1:9000")).unwrap();
        assert_eq!(inst.status, InstanceStatus::Unknown);

        store.update_instance_status(&inst.id, InstanceStatus::Healthy).unwrap();
        assert_eq!(
            store.get_instance(&inst.id).unwrap().status,
            InstanceStatus::Healthy
        );
    }

    #[test]
    fn deleting_a_service_cascades_to_instances() {
        let store = RegistryStore::new();
        let svc = store.add_service(service("a", "a.example.com")).unwrap();
        store.add_instance(Instance::new(&svc.id, "10.0.0.1:9000")).unwrap();
        store.add_instance(Instance::new(&svc.id, "10.0.0.2:9000")).unwrap();

        let removed = store.delete_service(&svc.id).unwrap();
        assert_eq!(removed, 2);
        assert!(store.list_instances(&svc.id).is_empty());
    }

    #[test]
    fn update_service_rejects_conflicting_header() {
        let store = RegistryStore::new();
        let a = store.add_service(service("a", "a.example.com")).unwrap();
        store.add_service(service("b", "b.example.com")).unwrap();

        let err = store
            .update_service(
                &a.id,
                ServiceUpdate {
                    header: Some("b.example.com".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateService("header")));

        // Re-asserting its own header is not a conflict.
        let updated = store
            .update_service(
                &a.id,
                ServiceUpdate {
                    header: Some("a.example.com".to_string()),
                    stateful: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated.stateful);
    }
}
