// Liveness broadcaster
// Reacts to component lifecycle events by maintaining the membership
// registry and one heartbeat connection per remote storage-tier host, and
// fans heartbeats out on clock boundary ticks.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use beacon_api::message::{HeartbeatRequest, TypedMessage};
use beacon_api::model::{ComponentConfiguration, ComponentKind, HostId};
use beacon_common::BeaconError;

use crate::connection::{ConnectionConfig, ConnectionError, ConnectionFailure, HeartbeatConnection};
use crate::event::LifecycleEvent;
use crate::model::Configuration;
use crate::pipeline::{HeartbeatPipeline, InboundMessage, PipelineConfig};
use crate::registry::ComponentRegistry;
use crate::transport::TransportConnector;

/// Broadcaster configuration
#[derive(Clone, Debug)]
pub struct BroadcasterConfig {
    /// Component kinds whose lifecycle drives membership; events for other
    /// kinds are ignored entirely
    pub tracked_kinds: HashSet<ComponentKind>,
    /// Address stamped as the heartbeat origin
    pub local_address: String,
    /// Queue depth for failures reported by connection tasks
    pub failure_queue_size: usize,
    /// Queue depth for decoded inbound messages
    pub inbound_queue_size: usize,
    pub pipeline: PipelineConfig,
    pub connection: ConnectionConfig,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            // Storage-tier kinds only; the controller never heartbeats itself
            tracked_kinds: [
                ComponentKind::Controller,
                ComponentKind::ObjectStorage,
                ComponentKind::BlockStorage,
            ]
            .into_iter()
            .filter(|kind| kind.is_storage_tier())
            .collect(),
            local_address: "127.0.0.1".to_string(),
            failure_queue_size: 64,
            inbound_queue_size: 256,
            pipeline: PipelineConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl BroadcasterConfig {
    /// Create a BroadcasterConfig from application Configuration.
    ///
    /// Unknown kind names in the tracked-kinds list are skipped with a
    /// warning; a list that resolves to no kinds at all is a configuration
    /// error.
    pub fn from_configuration(config: &Configuration) -> Result<Self, BeaconError> {
        let mut tracked_kinds = HashSet::new();
        for name in config.tracked_kinds() {
            match ComponentKind::from_str(&name) {
                Ok(kind) => {
                    tracked_kinds.insert(kind);
                }
                Err(e) => warn!("Ignoring unknown tracked component kind: {}", e),
            }
        }
        if tracked_kinds.is_empty() {
            return Err(BeaconError::IllegalArgument(
                "tracked-kinds resolves to no component kinds".to_string(),
            ));
        }

        let local_address = config.local_address();
        Ok(Self {
            tracked_kinds,
            local_address: local_address.clone(),
            failure_queue_size: 64,
            inbound_queue_size: config.inbound_queue_size(),
            pipeline: PipelineConfig {
                binding_name: config.binding_name(),
                signing_key: config.signing_key(),
                chunk_threshold: config.chunk_threshold(),
                local_address,
            },
            connection: ConnectionConfig::from_configuration(config),
        })
    }
}

/// Drives membership and heartbeat fan-out for storage-tier hosts
///
/// The broadcaster consumes lifecycle events on a single task; all state
/// transitions happen in event order. Connection I/O runs on per-connection
/// tasks that report back through the failure channel.
pub struct LivenessBroadcaster {
    config: BroadcasterConfig,
    registry: ComponentRegistry,
    connections: DashMap<HostId, Arc<HeartbeatConnection>>,
    connector: Arc<dyn TransportConnector>,
    failure_tx: mpsc::Sender<ConnectionFailure>,
    failure_rx: Mutex<Option<mpsc::Receiver<ConnectionFailure>>>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
}

impl LivenessBroadcaster {
    pub fn new(config: BroadcasterConfig, connector: Arc<dyn TransportConnector>) -> Self {
        let (failure_tx, failure_rx) = mpsc::channel(config.failure_queue_size);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_queue_size);
        Self {
            config,
            registry: ComponentRegistry::new(),
            connections: DashMap::new(),
            connector,
            failure_tx,
            failure_rx: Mutex::new(Some(failure_rx)),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
        }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Number of hosts with a live connection handle.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_connected(&self, host: &str) -> bool {
        self.connections.contains_key(host)
    }

    /// Consume lifecycle events until the sender side closes.
    ///
    /// Also drains connection failures and inbound acknowledgements. Can be
    /// entered once; a second call returns immediately.
    pub async fn run(&self, mut event_rx: mpsc::Receiver<LifecycleEvent>) {
        let Some(mut failure_rx) = self.failure_rx.lock().await.take() else {
            warn!("Liveness broadcaster is already running");
            return;
        };
        let Some(mut inbound_rx) = self.inbound_rx.lock().await.take() else {
            warn!("Liveness broadcaster is already running");
            return;
        };

        info!(
            "Liveness broadcaster started (origin: {}, tracked kinds: {})",
            self.config.local_address,
            self.config.tracked_kinds.len()
        );

        loop {
            tokio::select! {
                event = event_rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                Some(failure) = failure_rx.recv() => {
                    self.handle_connection_failure(failure);
                }
                Some(inbound) = inbound_rx.recv() => {
                    self.handle_inbound(inbound);
                }
            }
        }

        info!("Liveness broadcaster stopped, closing {} connections", self.connections.len());
        for entry in self.connections.iter() {
            entry.value().close();
        }
        self.connections.clear();
    }

    /// Apply one lifecycle event to the registry and connection set.
    pub async fn handle_event(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::ComponentStarted { config, local } => {
                if !self.tracks(&config, local) {
                    return;
                }
                self.on_component_started(config);
            }
            LifecycleEvent::ComponentStopped { config, local } => {
                if !self.tracks(&config, local) {
                    return;
                }
                self.on_component_stopped(config);
            }
            LifecycleEvent::ClockTick { boundary } => {
                if boundary {
                    self.on_boundary_tick();
                }
            }
        }
    }

    /// Local components never get a connection; only tracked kinds count
    /// toward membership.
    fn tracks(&self, config: &ComponentConfiguration, local: bool) -> bool {
        if local {
            debug!("Ignoring local component event: {}", config);
            return false;
        }
        if !self.config.tracked_kinds.contains(&config.kind) {
            debug!("Ignoring untracked component kind: {}", config.kind);
            return false;
        }
        if !beacon_common::is_valid_host_id(&config.host_name) {
            warn!("Ignoring component with invalid host id: {:?}", config.host_name);
            return false;
        }
        true
    }

    fn on_component_started(&self, config: ComponentConfiguration) {
        let host = config.host_name.clone();
        let port = config.port;

        let new_host = self.registry.register(&host, config);
        if !self.connections.contains_key(&host) {
            info!("-> Registering heartbeat client for host: {}", host);
            self.open_connection(host.clone(), port);
        }

        // A freshly joined host needs the full membership picture, so every
        // peer gets its own current snapshot again.
        if new_host {
            self.broadcast_snapshots();
        }
    }

    fn on_component_stopped(&self, config: ComponentConfiguration) {
        let host = config.host_name.clone();
        let emptied = self.registry.unregister(&host, &config);
        if emptied {
            if let Some((_, connection)) = self.connections.remove(&host) {
                info!("-> Removing heartbeat client for host: {}", host);
                connection.close();
            }
        }
    }

    /// On the back edge of the clock every open connection gets a heartbeat
    /// carrying that host's own component snapshot. Registered hosts that
    /// lost their connection get a fresh one first.
    fn on_boundary_tick(&self) {
        for host in self.registry.all_hosts() {
            if !self.connections.contains_key(&host) {
                let Some(config) = self.registry.configs_for(&host).into_iter().next() else {
                    continue;
                };
                info!("-> Reconnecting heartbeat client for host: {}", host);
                self.open_connection(host, config.port);
            }
        }
        self.broadcast_snapshots();
    }

    /// Send each connected host a heartbeat listing its own registered
    /// components.
    fn broadcast_snapshots(&self) {
        for entry in self.connections.iter() {
            self.send_snapshot(entry.value());
        }
    }

    fn send_snapshot(&self, connection: &HeartbeatConnection) {
        let host = connection.host().to_string();
        let components = match self.registry.snapshot_for(&host) {
            Ok(components) => components,
            Err(e) => {
                warn!("Skipping heartbeat to {}: {}", host, e);
                return;
            }
        };

        let request = HeartbeatRequest::new(self.config.local_address.clone(), host.clone(), components);
        debug!("Sending heartbeat to {} ({})", host, request.request_id);
        match connection.send(TypedMessage::Heartbeat(request)) {
            Ok(()) => {}
            Err(ConnectionError::NotConnected(_)) => {
                debug!("Heartbeat to {} skipped: connection closed", host)
            }
            Err(e) => warn!("Failed to queue heartbeat to {}: {}", host, e),
        }
    }

    fn open_connection(&self, host: HostId, port: u16) {
        let pipeline = match HeartbeatPipeline::build(&self.config.pipeline, &host, port) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                warn!("Cannot build heartbeat pipeline for {}: {}", host, e);
                return;
            }
        };
        if !pipeline.has_security() {
            warn!("Heartbeats to {} will be unsigned", host);
        }

        let connection = HeartbeatConnection::open(
            host.clone(),
            port,
            pipeline,
            self.connector.clone(),
            &self.config.connection,
            self.failure_tx.clone(),
            self.inbound_tx.clone(),
        );
        self.connections.insert(host, Arc::new(connection));
    }

    /// Drop the failed handle. The registry entry survives so the next
    /// boundary tick or lifecycle event re-creates the connection.
    fn handle_connection_failure(&self, failure: ConnectionFailure) {
        warn!(
            "Heartbeat connection to {} failed: {}",
            failure.host, failure.error
        );
        if let Some((_, connection)) = self.connections.remove(&failure.host) {
            connection.close();
        }
    }

    fn handle_inbound(&self, inbound: InboundMessage) {
        match inbound.message {
            TypedMessage::Ack(ack) => {
                if ack.is_success() {
                    debug!("Heartbeat {} acknowledged by {}", ack.request_id, inbound.host);
                } else {
                    warn!(
                        "Heartbeat {} rejected by {} (code {}): {}",
                        ack.request_id, inbound.host, ack.result_code, ack.message
                    );
                }
            }
            TypedMessage::Heartbeat(request) => {
                debug!(
                    "Ignoring inbound heartbeat {} from {}",
                    request.request_id, inbound.host
                );
            }
        }
    }
}
