//! Beacon Common - Shared types, errors and utilities
//!
//! This crate provides the foundational pieces used across all Beacon
//! components:
//! - Error types shared at crate seams
//! - Host identifier validation
//! - Local address discovery
//! - Common wire constants

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::BeaconError;
pub use utils::{is_valid_host_id, local_ip};

/// Binding name for the component heartbeat message schema.
///
/// Fixed at pipeline construction; never negotiated at runtime.
pub const COMPONENT_BINDING: &str = "beacon-components";

/// Request path used by the heartbeat framing stage.
pub const HEARTBEAT_PATH: &str = "/services/Heartbeat";

// Framing header names
pub const FRAME_HOST: &str = "Host";
pub const FRAME_CONTENT_LENGTH: &str = "Content-Length";
pub const FRAME_TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const FRAME_CHUNKED: &str = "chunked";

/// Default port a storage-tier peer listens on for heartbeats.
pub const DEFAULT_HEARTBEAT_PORT: u16 = 8773;

/// Default size threshold above which bodies are chunk-encoded.
pub const DEFAULT_CHUNK_THRESHOLD: usize = 8 * 1024;
