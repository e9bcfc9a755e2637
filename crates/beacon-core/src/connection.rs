// Heartbeat connection handle
// Owns one outbound transport connection and the protocol pipeline bound to
// it. One handle exists per host currently known to the broadcaster.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use beacon_api::message::TypedMessage;
use beacon_api::model::HostId;

use crate::model::Configuration;
use crate::pipeline::{HeartbeatPipeline, InboundDispatcher, InboundMessage, PipelineError, framing};
use crate::transport::TransportConnector;

/// Connection-scoped errors
#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("pipeline failure: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("connection to '{0}' is not open")]
    NotConnected(HostId),

    #[error("send queue to '{0}' is full")]
    QueueFull(HostId),
}

/// Fatal failure reported back to the broadcaster
///
/// The broadcaster drops the handle from its active set; the registry entry
/// for the host is left intact so a later event can re-create the
/// connection.
#[derive(Debug)]
pub struct ConnectionFailure {
    pub host: HostId,
    pub error: ConnectionError,
}

/// Configuration for heartbeat connections
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Outbound messages queued while the connection establishes
    pub send_queue_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            send_queue_size: 64,
        }
    }
}

impl ConnectionConfig {
    /// Create a ConnectionConfig from application Configuration
    pub fn from_configuration(config: &Configuration) -> Self {
        Self {
            connect_timeout: Duration::from_millis(config.connect_timeout_ms()),
            send_queue_size: config.send_queue_size(),
        }
    }
}

/// One outbound heartbeat channel to one remote host
pub struct HeartbeatConnection {
    host: HostId,
    port: u16,
    created_at: i64,
    outbound_tx: mpsc::Sender<TypedMessage>,
    close_tx: watch::Sender<bool>,
    closed: Arc<AtomicBool>,
}

impl HeartbeatConnection {
    /// Open a connection to `host:port`.
    ///
    /// Non-blocking: transport establishment happens on the spawned I/O
    /// task. Messages sent before the connect completes are queued on the
    /// outbound channel. Fatal errors are reported on `failure_tx`; decoded
    /// inbound messages go to `inbound_tx`.
    pub fn open(
        host: HostId,
        port: u16,
        pipeline: HeartbeatPipeline,
        connector: Arc<dyn TransportConnector>,
        config: &ConnectionConfig,
        failure_tx: mpsc::Sender<ConnectionFailure>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.send_queue_size);
        let (close_tx, close_rx) = watch::channel(false);
        let closed = Arc::new(AtomicBool::new(false));

        let io = IoTask {
            host: host.clone(),
            port,
            pipeline,
            connector,
            outbound_rx,
            close_rx,
            closed: closed.clone(),
            failure_tx,
            dispatcher: InboundDispatcher::new(host.clone(), inbound_tx),
        };
        tokio::spawn(io.run());

        info!("Opening heartbeat connection to {}:{}", host, port);

        Self {
            host,
            port,
            created_at: chrono::Utc::now().timestamp_millis(),
            outbound_tx,
            close_tx,
            closed,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Submit a message for encoding and transmission.
    ///
    /// Fire-and-forget: success here means the message is queued; failures
    /// during encode or write surface later as a [`ConnectionFailure`].
    pub fn send(&self, message: TypedMessage) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::NotConnected(self.host.clone()));
        }

        match self.outbound_tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(ConnectionError::NotConnected(self.host.clone()))
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Send queue to {} is full, dropping heartbeat", self.host);
                Err(ConnectionError::QueueFull(self.host.clone()))
            }
        }
    }

    /// Tear down the transport connection and release pipeline state.
    ///
    /// Idempotent; in-flight sends completing after close are discarded.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.close_tx.send(true);
        info!("Closed heartbeat connection to {}", self.host);
    }
}

struct IoTask {
    host: HostId,
    port: u16,
    pipeline: HeartbeatPipeline,
    connector: Arc<dyn TransportConnector>,
    outbound_rx: mpsc::Receiver<TypedMessage>,
    close_rx: watch::Receiver<bool>,
    closed: Arc<AtomicBool>,
    failure_tx: mpsc::Sender<ConnectionFailure>,
    dispatcher: InboundDispatcher,
}

impl IoTask {
    async fn run(mut self) {
        let mut transport = match self.connector.connect(&self.host, self.port).await {
            Ok(transport) => transport,
            Err(e) => {
                self.fail(ConnectionError::TransportUnavailable(e.to_string()))
                    .await;
                return;
            }
        };
        debug!("Heartbeat connection to {}:{} established", self.host, self.port);

        let mut read_buf = BytesMut::new();
        loop {
            tokio::select! {
                _ = self.close_rx.changed() => {
                    let _ = transport.shutdown().await;
                    return;
                }
                outbound = self.outbound_rx.recv() => match outbound {
                    Some(message) => {
                        let frame = match self.pipeline.encode_message(message) {
                            Ok(frame) => frame,
                            Err(e) => {
                                let _ = transport.shutdown().await;
                                self.fail(ConnectionError::Pipeline(e)).await;
                                return;
                            }
                        };
                        if let Err(e) = transport.write_frame(&frame).await {
                            self.fail(ConnectionError::TransportUnavailable(e.to_string()))
                                .await;
                            return;
                        }
                    }
                    // Handle dropped without close(); shut down quietly
                    None => {
                        let _ = transport.shutdown().await;
                        return;
                    }
                },
                chunk = transport.read_chunk() => match chunk {
                    Ok(Some(bytes)) => {
                        read_buf.extend_from_slice(&bytes);
                        if !self.drain_frames(&mut read_buf).await {
                            let _ = transport.shutdown().await;
                            return;
                        }
                    }
                    Ok(None) => {
                        self.fail(ConnectionError::TransportUnavailable(
                            "peer closed the connection".to_string(),
                        ))
                        .await;
                        return;
                    }
                    Err(e) => {
                        self.fail(ConnectionError::TransportUnavailable(e.to_string()))
                            .await;
                        return;
                    }
                },
            }
        }
    }

    /// Decode every complete frame in the buffer and dispatch the messages.
    /// Returns false when the task must stop.
    async fn drain_frames(&mut self, read_buf: &mut BytesMut) -> bool {
        loop {
            match framing::split_frame(read_buf) {
                Ok(Some(frame)) => match self.pipeline.decode_frame(frame) {
                    Ok(message) => {
                        if !self.dispatcher.dispatch(message).await {
                            self.fail(ConnectionError::NotConnected(self.host.clone())).await;
                            return false;
                        }
                    }
                    Err(e) => {
                        self.fail(ConnectionError::Pipeline(e)).await;
                        return false;
                    }
                },
                Ok(None) => return true,
                Err(e) => {
                    self.fail(ConnectionError::Pipeline(e)).await;
                    return false;
                }
            }
        }
    }

    /// Report a fatal error unless the handle was already closed; errors
    /// observed after close are discarded.
    async fn fail(&self, error: ConnectionError) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Discarding post-close error for {}: {}", self.host, error);
            return;
        }
        warn!("Heartbeat connection to {} failed: {}", self.host, error);
        let _ = self
            .failure_tx
            .send(ConnectionFailure {
                host: self.host.clone(),
                error,
            })
            .await;
    }
}
