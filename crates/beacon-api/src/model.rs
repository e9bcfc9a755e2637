//! Component model shared across Beacon
//!
//! Defines the component kinds the broadcaster can track and the immutable
//! configuration value describing one managed component instance.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a cluster node (hostname or address).
///
/// The sole key for registry and connection lookups.
pub type HostId = String;

/// Kind of managed component running on a cluster node
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentKind {
    /// Cluster controller (never tracked by the broadcaster)
    Controller,
    /// Object storage tier
    ObjectStorage,
    /// Block storage tier
    BlockStorage,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Controller => "CONTROLLER",
            ComponentKind::ObjectStorage => "OBJECTSTORAGE",
            ComponentKind::BlockStorage => "BLOCKSTORAGE",
        }
    }

    /// Whether this kind belongs to the remote storage tier
    pub fn is_storage_tier(&self) -> bool {
        matches!(
            self,
            ComponentKind::ObjectStorage | ComponentKind::BlockStorage
        )
    }
}

impl Display for ComponentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONTROLLER" => Ok(ComponentKind::Controller),
            "OBJECTSTORAGE" => Ok(ComponentKind::ObjectStorage),
            "BLOCKSTORAGE" => Ok(ComponentKind::BlockStorage),
            _ => Err(format!("Invalid component kind: {}", s)),
        }
    }
}

/// Immutable value describing one managed component instance
///
/// Multiple configurations may exist per host (several component kinds on
/// one node). Equality and hashing cover all identity fields so the registry
/// can hold these in sets with idempotent insertion.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfiguration {
    /// Component kind
    pub kind: ComponentKind,
    /// Opaque component instance name
    pub name: String,
    /// Host the component runs on
    pub host_name: HostId,
    /// Port the component's heartbeat endpoint listens on
    #[serde(default = "default_heartbeat_port")]
    pub port: u16,
    /// Service path on the remote node
    pub service_path: String,
}

fn default_heartbeat_port() -> u16 {
    beacon_common::DEFAULT_HEARTBEAT_PORT
}

impl ComponentConfiguration {
    pub fn new(kind: ComponentKind, name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            name: name.into(),
            host_name: host.into(),
            port,
            service_path: beacon_common::HEARTBEAT_PATH.to_string(),
        }
    }
}

impl Display for ComponentConfiguration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}@{}:{}",
            self.kind, self.name, self.host_name, self.port
        )
    }
}
