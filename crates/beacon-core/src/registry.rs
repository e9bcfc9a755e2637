// Component registry
// Concurrency-safe mapping from host identifier to the set of component
// configurations currently believed live on that host.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use beacon_api::model::{ComponentConfiguration, HostId};

/// Errors raised by registry lookups
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("host '{0}' not registered")]
    UnknownHost(HostId),
}

/// Registry of live component configurations keyed by host
///
/// A host appears here only while at least one configuration is registered
/// for it; removing the last configuration removes the host entry entirely.
/// All operations are idempotent so redelivered lifecycle events are
/// harmless. Reads may race with writes; iteration never blocks writers.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    hosts: Arc<DashMap<HostId, HashSet<ComponentConfiguration>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            hosts: Arc::new(DashMap::new()),
        }
    }

    /// Add `config` to `host`'s set.
    ///
    /// Returns whether the host was newly created by this call. Registering
    /// the same pair twice is a no-op.
    pub fn register(&self, host: &str, config: ComponentConfiguration) -> bool {
        let mut entry = self.hosts.entry(host.to_string()).or_default();
        let newly_created = entry.is_empty();
        if entry.insert(config) {
            debug!("Registered configuration for host: {}", host);
        }
        newly_created
    }

    /// Remove `config` from `host`'s set.
    ///
    /// Returns whether the host's set became empty as a result of this call
    /// (the signal to tear down the host's connection). Removing an absent
    /// pair is a no-op and returns false.
    pub fn unregister(&self, host: &str, config: &ComponentConfiguration) -> bool {
        let Some(mut entry) = self.hosts.get_mut(host) else {
            return false;
        };

        let removed = entry.remove(config);
        let now_empty = entry.is_empty();
        drop(entry);

        if removed {
            debug!("Unregistered configuration for host: {}", host);
        }

        if removed && now_empty {
            self.hosts.remove_if(host, |_, set| set.is_empty());
            return true;
        }
        false
    }

    /// Current configuration set for `host`, empty if absent.
    pub fn configs_for(&self, host: &str) -> Vec<ComponentConfiguration> {
        self.hosts
            .get(host)
            .map(|entry| entry.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Configuration snapshot for an addressed send.
    ///
    /// Unlike [`configs_for`](Self::configs_for), addressing a host with no
    /// registry entry is an error the caller must handle.
    pub fn snapshot_for(&self, host: &str) -> Result<Vec<ComponentConfiguration>, RegistryError> {
        self.hosts
            .get(host)
            .map(|entry| entry.iter().cloned().collect())
            .ok_or_else(|| RegistryError::UnknownHost(host.to_string()))
    }

    /// All hosts currently registered. Each call produces a fresh snapshot;
    /// iteration is safe while registrations continue concurrently.
    pub fn all_hosts(&self) -> Vec<HostId> {
        self.hosts.iter().map(|e| e.key().clone()).collect()
    }

    pub fn contains_host(&self, host: &str) -> bool {
        self.hosts.contains_key(host)
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }
}
