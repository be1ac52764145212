//! Service and instance registry.
//!
//! Services are routing targets keyed by their Host header; instances are
//! the `host:port` backends belonging to a service. The store enforces the
//! same unique indexes a document database would (`services.name`,
//! `services.header`, `instances.(service_id, addr)`), and the gateway is
//! the narrow read/status-write view the router and health checker consume.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod gateway;
pub mod store;

pub use gateway::RegistryGateway;
pub use store::RegistryStore;

/// Instance-selection strategy configured per service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    IpHash,
    LeastConnection,
    WeightedRoundRobin,
}

/// Health state of a backend instance. New instances start as `Unknown`
/// until the health checker has probed them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Healthy,
    Unhealthy,
    #[default]
    Unknown,
}

/// A routing target selected by the request's Host header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    #[serde(default = "new_id")]
    pub id: String,
    pub name: String,
    /// Host-header value that selects this service. Unique across services.
    pub header: String,
    #[serde(default)]
    pub algorithm: Algorithm,
    /// When true, selection consults the sticky-session table first.
    #[serde(default)]
    pub stateful: bool,
}

/// A backend endpoint belonging to a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default = "new_id")]
    pub id: String,
    pub service_id: String,
    /// `host:port`. Unique within a service.
    pub addr: String,
    #[serde(default)]
    pub status: InstanceStatus,
    /// Used only by weighted round-robin.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl Service {
    pub fn new(name: impl Into<String>, header: impl Into<String>, algorithm: Algorithm) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            header: header.into(),
            algorithm,
            stateful: false,
        }
    }
}

impl Instance {
    pub fn new(service_id: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            service_id: service_id.into(),
            addr: addr.into(),
            status: InstanceStatus::Unknown,
            weight: default_weight(),
        }
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_weight() -> u32 {
    1
}

/// Fields of a service that the management API may change in place.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceUpdate {
    pub name: Option<String>,
    pub header: Option<String>,
    pub algorithm: Option<Algorithm>,
    pub stateful: Option<bool>,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Service with this {0} already exists")]
    DuplicateService(&'static str),

    #[error("Instance with address '{0}' already exists for this service")]
    DuplicateInstance(String),

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Instance not found")]
    InstanceNotFound,
}
