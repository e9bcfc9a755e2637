// Core configuration model

use beacon_common::{BeaconError, COMPONENT_BINDING, DEFAULT_CHUNK_THRESHOLD};

/// Application configuration wrapper
/// Provides access to configuration values for the liveness broadcaster
#[derive(Clone, Debug)]
pub struct Configuration {
    pub config: config::Config,
}

impl Configuration {
    /// Create a new configuration from a Config instance
    pub fn from_config(config: config::Config) -> Self {
        Self { config }
    }

    /// Load configuration from a file (yml, toml or json by extension)
    pub fn from_file(path: &str) -> Result<Self, BeaconError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .map_err(|e| BeaconError::ConfigError(e.to_string()))?;
        Ok(Self { config })
    }

    /// Get the lifecycle event queue size (default: 1024)
    pub fn event_queue_size(&self) -> usize {
        self.config
            .get_int("beacon.event.queue-size")
            .unwrap_or(1024) as usize
    }

    /// Get the inbound message queue size (default: 256)
    pub fn inbound_queue_size(&self) -> usize {
        self.config
            .get_int("beacon.broadcast.inbound-queue-size")
            .unwrap_or(256) as usize
    }

    /// Get the per-connection outbound queue size (default: 64)
    pub fn send_queue_size(&self) -> usize {
        self.config
            .get_int("beacon.broadcast.send-queue-size")
            .unwrap_or(64) as usize
    }

    /// Get the connection timeout in milliseconds (default: 5000ms)
    pub fn connect_timeout_ms(&self) -> u64 {
        self.config
            .get_int("beacon.broadcast.connect-timeout")
            .unwrap_or(5000) as u64
    }

    /// Get the body size above which frames switch to chunked transfer
    /// (default: 8KiB)
    pub fn chunk_threshold(&self) -> usize {
        self.config
            .get_int("beacon.broadcast.chunk-threshold")
            .unwrap_or(DEFAULT_CHUNK_THRESHOLD as i64) as usize
    }

    /// Get the base64 signing key for outbound envelopes, if configured
    pub fn signing_key(&self) -> Option<String> {
        self.config.get_string("beacon.broadcast.signing-key").ok()
    }

    /// Get the message binding name (default: beacon-components)
    pub fn binding_name(&self) -> String {
        self.config
            .get_string("beacon.broadcast.binding")
            .unwrap_or_else(|_| COMPONENT_BINDING.to_string())
    }

    /// Get the advertised local address, falling back to interface discovery
    pub fn local_address(&self) -> String {
        self.config
            .get_string("beacon.local-address")
            .unwrap_or_else(|_| beacon_common::utils::local_ip())
    }

    /// Get the component kinds whose lifecycle drives heartbeat membership
    /// (default: OBJECTSTORAGE,BLOCKSTORAGE)
    pub fn tracked_kinds(&self) -> Vec<String> {
        self.config
            .get_string("beacon.broadcast.tracked-kinds")
            .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| {
                vec!["OBJECTSTORAGE".to_string(), "BLOCKSTORAGE".to_string()]
            })
    }
}
