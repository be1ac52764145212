//! Sticky-session table for stateful services.
//!
//! Maps `(client_ip, service_id)` to the instance that served the client
//! last. Entries expire after a TTL of inactivity; a lookup hit refreshes
//! the timestamp. Expired entries are swept lazily from inside `lookup`
//! and `remember`, at most once per cleanup interval, so no dedicated
//! task is needed.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_TTL: Duration = Duration::from_secs(300);
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

struct Table {
    sessions: HashMap<(String, String), (String, Instant)>,
    last_cleanup: Instant,
}

pub struct StickySessionManager {
    table: Mutex<Table>,
    ttl: Duration,
    cleanup_interval: Duration,
}

impl Default for StickySessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CLEANUP_INTERVAL)
    }
}

impl StickySessionManager {
    pub fn new(ttl: Duration, cleanup_interval: Duration) -> Self {
        Self {
            table: Mutex::new(Table {
                sessions: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
            ttl,
            cleanup_interval,
        }
    }

    /// The mapped instance id, if the entry exists and is within TTL.
    /// A hit refreshes the entry's timestamp; a stale entry is deleted
    /// and treated as a miss.
    pub fn lookup(&self, client_ip: &str, service_id: &str) -> Option<String> {
        let mut table = self.table.lock();
        self.sweep_if_due(&mut table);

        let key = (client_ip.to_string(), service_id.to_string());
        match table.sessions.get_mut(&key) {
            Some((instance_id, touched)) if touched.elapsed() < self.ttl => {
                *touched = Instant::now();
                Some(instance_id.clone())
            },
            Some(_) => {
                table.sessions.remove(&key);
                None
            },
            None => None,
        }
    }

    /// Pin `client_ip` to `instance_id` for this service, overwriting any
    /// prior mapping.
    pub fn remember(&self, client_ip: &str, service_id: &str, instance_id: &str) {
        let mut table = self.table.lock();
        let key = (client_ip.to_string(), service_id.to_string());
        table.sessions.insert(key, (instance_id.to_string(), Instant::now()));
        self.sweep_if_due(&mut table);
    }

    /// Drop the mapping for `(client_ip, service_id)` if present.
    pub fn forget(&self, client_ip: &str, service_id: &str) {
        let mut table = self.table.lock();
        let key = (client_ip.to_string(), service_id.to_string());
        table.sessions.remove(&key);
    }

    fn sweep_if_due(&self, table: &mut Table) {
        if table.last_cleanup.elapsed() < self.cleanup_interval {
            return;
        }

        let ttl = self.ttl;
        let before = table.sessions.len();
        table.sessions.retain(|_, (_, touched)| touched.elapsed() < ttl);
        table.last_cleanup = Instant::now();

        let swept = before - table.sessions.len();
        if swept > 0 {
            debug!(swept, "expired sticky sessions removed");
        }
    }
}
