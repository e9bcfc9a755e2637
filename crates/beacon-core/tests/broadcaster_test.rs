// End-to-end tests driving the broadcaster through its run loop with an
// in-memory transport.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use beacon_api::message::{HeartbeatAck, TypedMessage};
use beacon_api::model::{ComponentConfiguration, ComponentKind};
use beacon_core::broadcaster::{BroadcasterConfig, LivenessBroadcaster};
use beacon_core::event::{LifecycleEvent, LifecycleEventPublisher};
use beacon_core::pipeline::{HeartbeatPipeline, PipelineConfig};
use beacon_core::transport::{Transport, TransportConnector};

const SIGNING_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

/// Transport that captures outbound frames and never produces inbound data.
struct SinkTransport {
    host: String,
    frames_tx: mpsc::UnboundedSender<(String, Bytes)>,
}

#[async_trait::async_trait]
impl Transport for SinkTransport {
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let _ = self
            .frames_tx
            .send((self.host.clone(), Bytes::copy_from_slice(frame)));
        Ok(())
    }

    async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
        futures::future::pending().await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct SinkConnector {
    frames_tx: mpsc::UnboundedSender<(String, Bytes)>,
}

#[async_trait::async_trait]
impl TransportConnector for SinkConnector {
    async fn connect(&self, host: &str, _port: u16) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(SinkTransport {
            host: host.to_string(),
            frames_tx: self.frames_tx.clone(),
        }))
    }
}

/// Connector that refuses a fixed number of attempts before succeeding.
struct FlakyConnector {
    refusals: AtomicUsize,
    frames_tx: mpsc::UnboundedSender<(String, Bytes)>,
}

#[async_trait::async_trait]
impl TransportConnector for FlakyConnector {
    async fn connect(&self, host: &str, _port: u16) -> io::Result<Box<dyn Transport>> {
        if self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ));
        }
        Ok(Box::new(SinkTransport {
            host: host.to_string(),
            frames_tx: self.frames_tx.clone(),
        }))
    }
}

/// Transport that answers every heartbeat with a successful acknowledgement.
struct AckingTransport {
    host: String,
    pipeline: HeartbeatPipeline,
    response_tx: mpsc::UnboundedSender<Bytes>,
    response_rx: mpsc::UnboundedReceiver<Bytes>,
    acked: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Transport for AckingTransport {
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let message = self
            .pipeline
            .decode_frame(Bytes::copy_from_slice(frame))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let TypedMessage::Heartbeat(request) = message else {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not a heartbeat"));
        };

        self.acked.fetch_add(1, Ordering::SeqCst);
        let ack = TypedMessage::Ack(HeartbeatAck::success(request.request_id));
        let response = self
            .pipeline
            .encode_message(ack)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let _ = self.response_tx.send(response);
        Ok(())
    }

    async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
        match self.response_rx.recv().await {
            Some(bytes) => Ok(Some(bytes)),
            None => Ok(None),
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct AckingConnector {
    acked: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl TransportConnector for AckingConnector {
    async fn connect(&self, host: &str, port: u16) -> io::Result<Box<dyn Transport>> {
        let pipeline = HeartbeatPipeline::build(&PipelineConfig::default(), host, port)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        Ok(Box::new(AckingTransport {
            host: host.to_string(),
            pipeline,
            response_tx,
            response_rx,
            acked: self.acked.clone(),
        }))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn object_storage(host: &str) -> ComponentConfiguration {
    ComponentConfiguration::new(ComponentKind::ObjectStorage, "osg", host, 8773)
}

fn block_storage(host: &str) -> ComponentConfiguration {
    ComponentConfiguration::new(ComponentKind::BlockStorage, "sc", host, 8773)
}

async fn next_frame(frames_rx: &mut mpsc::UnboundedReceiver<(String, Bytes)>) -> (String, Bytes) {
    tokio::time::timeout(Duration::from_secs(2), frames_rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("frame channel closed")
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn test_membership_and_fanout_over_run_loop() {
    init_tracing();
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    let broadcaster = Arc::new(LivenessBroadcaster::new(
        BroadcasterConfig::default(),
        Arc::new(SinkConnector { frames_tx }),
    ));
    let (publisher, event_rx) = LifecycleEventPublisher::new(64);
    publisher.start().await;

    let runner = broadcaster.clone();
    let run = tokio::spawn(async move { runner.run(event_rx).await });

    // First host joins and immediately receives its snapshot
    publisher
        .publish(LifecycleEvent::started(object_storage("node-1"), false))
        .await;
    let (host, frame) = next_frame(&mut frames_rx).await;
    assert_eq!(host, "node-1");
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert!(text.starts_with("POST /services/Heartbeat HTTP/1.1\r\n"));
    assert!(text.contains("OBJECTSTORAGE"));

    // Second host joins; every open connection gets the refreshed picture
    publisher
        .publish(LifecycleEvent::started(block_storage("node-2"), false))
        .await;
    let mut hosts = vec![next_frame(&mut frames_rx).await.0, next_frame(&mut frames_rx).await.0];
    hosts.sort();
    assert_eq!(hosts, vec!["node-1", "node-2"]);

    // Boundary tick sends one heartbeat per connected host, each listing
    // only that host's own components
    publisher.publish(LifecycleEvent::tick(true)).await;
    for _ in 0..2 {
        let (host, frame) = next_frame(&mut frames_rx).await;
        let text = String::from_utf8(frame.to_vec()).unwrap();
        match host.as_str() {
            "node-1" => {
                assert!(text.contains("OBJECTSTORAGE"));
                assert!(!text.contains("BLOCKSTORAGE"));
            }
            "node-2" => {
                assert!(text.contains("BLOCKSTORAGE"));
                assert!(!text.contains("OBJECTSTORAGE"));
            }
            other => panic!("unexpected host {}", other),
        }
    }

    // Non-boundary ticks are silent
    publisher.publish(LifecycleEvent::tick(false)).await;

    // Hosts empty out; their connections close
    publisher
        .publish(LifecycleEvent::stopped(object_storage("node-1"), false))
        .await;
    publisher
        .publish(LifecycleEvent::stopped(block_storage("node-2"), false))
        .await;
    wait_for(|| broadcaster.connection_count() == 0).await;
    assert_eq!(broadcaster.registry().host_count(), 0);
    assert!(frames_rx.try_recv().is_err());

    drop(publisher);
    run.await.unwrap();
}

#[tokio::test]
async fn test_signed_heartbeats_verify_with_shared_key() {
    init_tracing();
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    let mut config = BroadcasterConfig::default();
    config.pipeline.signing_key = Some(SIGNING_KEY.to_string());
    config.local_address = "10.0.0.1".to_string();
    let broadcaster =
        LivenessBroadcaster::new(config, Arc::new(SinkConnector { frames_tx }));

    broadcaster
        .handle_event(LifecycleEvent::started(object_storage("node-1"), false))
        .await;

    let (_, frame) = next_frame(&mut frames_rx).await;

    // A peer holding the same key accepts the frame and recovers the message
    let peer_pipeline = HeartbeatPipeline::build(
        &PipelineConfig {
            signing_key: Some(SIGNING_KEY.to_string()),
            ..PipelineConfig::default()
        },
        "node-1",
        8773,
    )
    .unwrap();
    assert!(peer_pipeline.has_security());

    let message = peer_pipeline.decode_frame(frame).unwrap();
    let TypedMessage::Heartbeat(request) = message else {
        panic!("expected a heartbeat");
    };
    assert_eq!(request.origin, "10.0.0.1");
    assert_eq!(request.target_host, "node-1");
    assert_eq!(request.components, vec![object_storage("node-1")]);
}

#[tokio::test]
async fn test_peer_acks_flow_back_without_disrupting_connection() {
    init_tracing();
    let acked = Arc::new(AtomicUsize::new(0));
    let broadcaster = Arc::new(LivenessBroadcaster::new(
        BroadcasterConfig::default(),
        Arc::new(AckingConnector { acked: acked.clone() }),
    ));
    let (publisher, event_rx) = LifecycleEventPublisher::new(64);
    publisher.start().await;

    let runner = broadcaster.clone();
    tokio::spawn(async move { runner.run(event_rx).await });

    publisher
        .publish(LifecycleEvent::started(object_storage("node-1"), false))
        .await;
    publisher.publish(LifecycleEvent::tick(true)).await;

    wait_for(|| acked.load(Ordering::SeqCst) >= 2).await;
    assert!(broadcaster.is_connected("node-1"));
}

#[tokio::test]
async fn test_failed_connect_recovers_on_boundary_tick() {
    init_tracing();
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    let broadcaster = Arc::new(LivenessBroadcaster::new(
        BroadcasterConfig::default(),
        Arc::new(FlakyConnector {
            refusals: AtomicUsize::new(1),
            frames_tx,
        }),
    ));
    let (publisher, event_rx) = LifecycleEventPublisher::new(64);
    publisher.start().await;

    let runner = broadcaster.clone();
    tokio::spawn(async move { runner.run(event_rx).await });

    // First attempt is refused; the handle is dropped but membership stays
    publisher
        .publish(LifecycleEvent::started(object_storage("node-1"), false))
        .await;
    wait_for(|| broadcaster.registry().contains_host("node-1")).await;
    wait_for(|| !broadcaster.is_connected("node-1")).await;

    // The next boundary tick re-opens the connection and the heartbeat
    // goes out
    publisher.publish(LifecycleEvent::tick(true)).await;
    let (host, frame) = next_frame(&mut frames_rx).await;
    assert_eq!(host, "node-1");
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert!(text.contains("HeartbeatRequest"));
    assert!(broadcaster.is_connected("node-1"));
}
