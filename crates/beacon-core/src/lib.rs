//! Beacon Core - Liveness broadcasting for storage-tier peers
//!
//! This crate provides:
//! - The component registry tracking which configurations are live per host
//! - The layered protocol pipeline converting typed messages to wire bytes
//! - Per-peer connection handles owning one outbound channel each
//! - The liveness broadcaster driving registrations, connections and fan-out

pub mod broadcaster;
pub mod connection;
pub mod event;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod transport;

// Re-export commonly used types
pub use broadcaster::{BroadcasterConfig, LivenessBroadcaster};
pub use connection::{ConnectionConfig, ConnectionError, ConnectionFailure, HeartbeatConnection};
pub use event::{LifecycleEvent, LifecycleEventPublisher};
pub use model::Configuration;
pub use pipeline::{HeartbeatPipeline, PipelineConfig, PipelineError};
pub use registry::{ComponentRegistry, RegistryError};

// Re-export common functions
pub use beacon_common::local_ip;
