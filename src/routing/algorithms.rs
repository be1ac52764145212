//! Load balancing algorithms for instance selection
//!
//! Implements the four selection strategies a service can be configured
//! with:
//! - Round-robin for simple fairness
//! - IP-hash for per-client determinism
//! - Least-connection for optimal load distribution
//! - Weighted round-robin for capacity-aware fairness
//!
//! Callers hand in the currently eligible instance set; no algorithm
//! filters by health itself. The cursors and the connection map are shared
//! across every service using the same algorithm.

use crate::registry::{Algorithm, Instance};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("No instances available")]
    NoInstances,

    #[error("Client IP is required for IP-hash selection")]
    MissingClientIp,
}

/// Shared selection state for all routing workers.
///
/// One cursor per round-robin flavor and one map of in-flight connection
/// counts. Selection takes brief critical sections only; no lock is held
/// across the upstream exchange.
#[derive(Default)]
pub struct AlgorithmSet {
    round_robin_cursor: AtomicUsize,
    weighted_cursor: AtomicUsize,
    connections: Mutex<HashMap<String, usize>>,
}

impl AlgorithmSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select an instance from `instances` using the given algorithm.
    ///
    /// For least-connection the selected instance's in-flight count is
    /// incremented; the caller must pair this with exactly one
    /// [`release`](Self::release) once the forward completes or fails.
    pub fn select(
        &self,
        algorithm: Algorithm,
        instances: &[Instance],
        client_ip: &str,
    ) -> Result<Instance, SelectionError> {
        if instances.is_empty() {
            return Err(SelectionError::NoInstances);
        }

        let selected = match algorithm {
            Algorithm::RoundRobin => self.select_round_robin(instances),
            Algorithm::IpHash => self.select_ip_hash(instances, client_ip)?,
            Algorithm::LeastConnection => self.select_least_connection(instances),
            Algorithm::WeightedRoundRobin => self.select_weighted_round_robin(instances),
        };

        debug!(algorithm = ?algorithm, instance = %selected.addr, "selected instance");
        Ok(selected)
    }

    /// Undo the accounting of a prior select. Only least-connection keeps
    /// per-instance state; the other algorithms are unaffected.
    pub fn release(&self, algorithm: Algorithm, instance_id: &str) {
        if algorithm != Algorithm::LeastConnection {
            return;
        }

        let mut connections = self.connections.lock();
        if let Some(count) = connections.get_mut(instance_id) {
            *count = count.saturating_sub(1);
        }
    }

    /// In-flight connection count tracked for an instance. Unknown ids
    /// count as zero.
    pub fn connection_count(&self, instance_id: &str) -> usize {
        self.connections.lock().get(instance_id).copied().unwrap_or(0)
    }

    fn select_round_robin(&self, instances: &[Instance]) -> Instance {
        let index = self.round_robin_cursor.fetch_add(1, Ordering::Relaxed);
        instances[index % instances.len()].clone()
    }

    fn select_ip_hash(
        &self,
        instances: &[Instance],
        client_ip: &str,
    ) -> Result<Instance, SelectionError> {
        if client_ip.is_empty() {
            return Err(SelectionError::MissingClientIp);
        }

        let digest = md5::compute(client_ip.as_bytes());
        let hash = u128::from_be_bytes(digest.0);
        let index = (hash % instances.len() as u128) as usize;
        Ok(instances[index].clone())
    }

    fn select_least_connection(&self, instances: &[Instance]) -> Instance {
        let mut connections = self.connections.lock();

        // First match wins on ties; the increment happens under the same
        // lock so two concurrent selections cannot both claim the minimum.
        let mut selected = &instances[0];
        let mut min_connections = connections.get(&selected.id).copied().unwrap_or(0);
        for instance in &instances[1..] {
            let count = connections.get(&instance.id).copied().unwrap_or(0);
            if count < min_connections {
                selected = instance;
                min_connections = count;
            }
        }

        *connections.entry(selected.id.clone()).or_insert(0) += 1;
        selected.clone()
    }

    fn select_weighted_round_robin(&self, instances: &[Instance]) -> Instance {
        let expanded: Vec<&Instance> = instances
            .iter()
            .flat_map(|i| std::iter::repeat(i).take(i.weight as usize))
            .collect();

        if expanded.is_empty() {
            return instances[0].clone();
        }

        let index = self.weighted_cursor.fetch_add(1, Ordering::Relaxed);
        expanded[index % expanded.len()].clone()
    }
}
