// Lifecycle event handling
// Provides the event source seam the broadcaster consumes: component
// start/stop notifications and the periodic clock signal.

use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::{debug, info};

use beacon_api::model::ComponentConfiguration;

/// Tagged variant over every event the broadcaster reacts to
///
/// The event source guarantees at-least-once delivery and may redeliver;
/// every consumer operation must therefore be idempotent.
#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleEvent {
    /// A component came up somewhere in the cluster
    ComponentStarted {
        config: ComponentConfiguration,
        /// Whether the event concerns the local node
        local: bool,
    },
    /// A component went down
    ComponentStopped {
        config: ComponentConfiguration,
        local: bool,
    },
    /// Periodic clock signal; `boundary` marks the close of one heartbeat
    /// interval
    ClockTick { boundary: bool },
}

impl LifecycleEvent {
    pub fn started(config: ComponentConfiguration, local: bool) -> Self {
        LifecycleEvent::ComponentStarted { config, local }
    }

    pub fn stopped(config: ComponentConfiguration, local: bool) -> Self {
        LifecycleEvent::ComponentStopped { config, local }
    }

    pub fn tick(boundary: bool) -> Self {
        LifecycleEvent::ClockTick { boundary }
    }
}

/// Trait for handling lifecycle events out-of-band
#[async_trait::async_trait]
pub trait LifecycleEventListener: Send + Sync {
    async fn on_lifecycle_event(&self, event: &LifecycleEvent);
}

/// Lifecycle event publisher
/// Fans events out to the broadcaster queue, broadcast subscribers and
/// registered listeners
pub struct LifecycleEventPublisher {
    broadcast_tx: broadcast::Sender<LifecycleEvent>,
    event_tx: mpsc::Sender<LifecycleEvent>,
    listeners: Arc<RwLock<Vec<Arc<dyn LifecycleEventListener>>>>,
    running: Arc<RwLock<bool>>,
}

impl LifecycleEventPublisher {
    /// Create a publisher sized from application Configuration.
    pub fn from_configuration(
        config: &crate::model::Configuration,
    ) -> (Self, mpsc::Receiver<LifecycleEvent>) {
        Self::new(config.event_queue_size())
    }

    /// Create a new publisher; returns the receiver the broadcaster consumes.
    pub fn new(queue_size: usize) -> (Self, mpsc::Receiver<LifecycleEvent>) {
        let (broadcast_tx, _) = broadcast::channel(queue_size);
        let (event_tx, event_rx) = mpsc::channel(queue_size);

        (
            Self {
                broadcast_tx,
                event_tx,
                listeners: Arc::new(RwLock::new(Vec::new())),
                running: Arc::new(RwLock::new(false)),
            },
            event_rx,
        )
    }

    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            return;
        }
        *running = true;
        info!("Starting lifecycle event publisher");
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("Stopped lifecycle event publisher");
    }

    /// Register a listener for lifecycle events
    pub async fn register_listener(&self, listener: Arc<dyn LifecycleEventListener>) {
        let mut listeners = self.listeners.write().await;
        listeners.push(listener);
        debug!("Registered lifecycle listener, total: {}", listeners.len());
    }

    /// Publish a lifecycle event
    pub async fn publish(&self, event: LifecycleEvent) {
        let is_running = *self.running.read().await;
        if !is_running {
            return;
        }

        debug!("Publishing lifecycle event: {:?}", event);

        // Queue for the broadcaster
        let _ = self.event_tx.send(event.clone()).await;

        // Broadcast to subscribers
        let _ = self.broadcast_tx.send(event.clone());

        // Notify listeners
        let listeners = self.listeners.read().await;
        for listener in listeners.iter() {
            listener.on_lifecycle_event(&event).await;
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.broadcast_tx.subscribe()
    }
}

/// A simple logging listener for debugging
pub struct LoggingLifecycleListener;

#[async_trait::async_trait]
impl LifecycleEventListener for LoggingLifecycleListener {
    async fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::ComponentStarted { config, local } => {
                info!(
                    "[LifecycleEvent] Component started: {} (local: {})",
                    config, local
                );
            }
            LifecycleEvent::ComponentStopped { config, local } => {
                info!(
                    "[LifecycleEvent] Component stopped: {} (local: {})",
                    config, local
                );
            }
            LifecycleEvent::ClockTick { boundary } => {
                debug!("[LifecycleEvent] Clock tick (boundary: {})", boundary);
            }
        }
    }
}
