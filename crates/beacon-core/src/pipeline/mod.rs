// Protocol pipeline
// Ordered, pluggable stages converting between typed heartbeat messages and
// transport-framed wire bytes for one connection.

pub mod addressing;
pub mod binding;
pub mod chunking;
pub mod dispatch;
pub mod envelope;
pub mod framing;
pub mod security;
pub mod serialize;

use bytes::Bytes;
use tracing::error;

use beacon_api::binding::BindingError;
use beacon_api::envelope::{Envelope, MessagePayload};
use beacon_api::message::TypedMessage;

use addressing::AddressingStage;
use binding::BindingStage;
use chunking::ChunkingStage;
use envelope::EnvelopeStage;
use framing::FramingStage;
use security::SecurityStage;
use serialize::SerializationStage;

pub use dispatch::{InboundDispatcher, InboundMessage};

/// Per-message pipeline failures. Fatal for the owning connection.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("stage '{stage}' received an unexpected item, expected {expected}")]
    UnexpectedItem {
        stage: &'static str,
        expected: &'static str,
    },

    #[error("binding failure: {0}")]
    Binding(#[from] BindingError),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("inbound envelope signature does not match body")]
    SignatureMismatch,

    #[error("inbound envelope carries no signature")]
    MissingSignature,

    #[error("addressing failure: {0}")]
    Addressing(String),
}

/// The representations flowing between pipeline stages
///
/// Each stage consumes exactly one representation per direction and produces
/// the next; receiving anything else is an
/// [`UnexpectedItem`](PipelineError::UnexpectedItem) failure.
#[derive(Clone, Debug)]
pub enum WireItem {
    /// Concrete typed message (application end)
    Message(TypedMessage),
    /// Generic payload produced/consumed by the binding stage
    Payload(MessagePayload),
    /// Structured envelope with routing and signature metadata
    Envelope(Envelope),
    /// Serialized body bytes, possibly chunk-encoded
    Body { bytes: Bytes, chunked: bool },
    /// Transport-framed bytes (wire end)
    Frame(Bytes),
}

impl WireItem {
    fn description(&self) -> &'static str {
        match self {
            WireItem::Message(_) => "message",
            WireItem::Payload(_) => "payload",
            WireItem::Envelope(_) => "envelope",
            WireItem::Body { .. } => "body",
            WireItem::Frame(_) => "frame",
        }
    }
}

/// One ordered transformation step in the codec chain
///
/// `encode` is the outbound direction (message towards the wire), `decode`
/// the inbound one. Stages are stateless across messages except for the
/// security stage, which carries per-connection key material.
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn encode(&self, item: WireItem) -> Result<WireItem, PipelineError>;

    fn decode(&self, item: WireItem) -> Result<WireItem, PipelineError>;
}

pub(crate) fn unexpected(stage: &'static str, expected: &'static str) -> PipelineError {
    PipelineError::UnexpectedItem { stage, expected }
}

/// Pipeline construction parameters, one instance per connection
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Fixed binding name selecting the typed-message schema
    pub binding_name: String,
    /// Base64 HMAC key for the security stage; absent or invalid key material
    /// degrades the pipeline to unsigned heartbeats
    pub signing_key: Option<String>,
    /// Bodies above this size are chunk-encoded
    pub chunk_threshold: usize,
    /// Local address stamped into the envelope `from` header
    pub local_address: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            binding_name: beacon_common::COMPONENT_BINDING.to_string(),
            signing_key: None,
            chunk_threshold: beacon_common::DEFAULT_CHUNK_THRESHOLD,
            local_address: "127.0.0.1".to_string(),
        }
    }
}

/// The layered codec for one connection
///
/// Stages are held wire-nearest-first in a fixed order:
/// framing, chunking, serialization, security, addressing, envelope, binding.
/// Inbound traverses the list forwards, outbound in reverse. The order never
/// changes after construction.
pub struct HeartbeatPipeline {
    stages: Vec<Box<dyn PipelineStage>>,
    has_security: bool,
}

impl HeartbeatPipeline {
    /// Assemble the stage list for a connection to `peer_host:peer_port`.
    ///
    /// An unknown binding name is fatal. A security stage that cannot be
    /// constructed is NOT: the failure is logged and the pipeline is built
    /// without it, so heartbeats to this peer traverse the network unsigned.
    pub fn build(
        config: &PipelineConfig,
        peer_host: &str,
        peer_port: u16,
    ) -> Result<Self, BindingError> {
        let binding = beacon_api::binding::BindingManager::get(&config.binding_name)?;
        let peer_address = format!("{}:{}", peer_host, peer_port);

        let mut stages: Vec<Box<dyn PipelineStage>> = Vec::with_capacity(7);
        stages.push(Box::new(FramingStage::new(peer_host, peer_port)));
        stages.push(Box::new(ChunkingStage::new(config.chunk_threshold)));
        stages.push(Box::new(SerializationStage));

        let mut has_security = false;
        match SecurityStage::new(config.signing_key.as_deref()) {
            Ok(stage) => {
                stages.push(Box::new(stage));
                has_security = true;
            }
            Err(e) => {
                error!(
                    "Failed to construct security stage for {}: {}; heartbeats will be sent unsigned",
                    peer_address, e
                );
            }
        }

        stages.push(Box::new(AddressingStage::new(
            config.local_address.clone(),
            peer_address,
        )));
        stages.push(Box::new(EnvelopeStage));
        stages.push(Box::new(BindingStage::new(binding)));

        Ok(Self {
            stages,
            has_security,
        })
    }

    /// Whether envelope signing/verification is active on this pipeline.
    pub fn has_security(&self) -> bool {
        self.has_security
    }

    /// Run a typed message outbound through every stage, producing one
    /// transport frame.
    pub fn encode_message(&self, message: TypedMessage) -> Result<Bytes, PipelineError> {
        let mut item = WireItem::Message(message);
        for stage in self.stages.iter().rev() {
            item = stage.encode(item)?;
        }
        match item {
            WireItem::Frame(bytes) => Ok(bytes),
            other => Err(PipelineError::MalformedFrame(format!(
                "pipeline terminated outbound with {}",
                other.description()
            ))),
        }
    }

    /// Run one complete inbound frame through every stage, producing the
    /// decoded typed message.
    pub fn decode_frame(&self, frame: Bytes) -> Result<TypedMessage, PipelineError> {
        let mut item = WireItem::Frame(frame);
        for stage in self.stages.iter() {
            item = stage.decode(item)?;
        }
        match item {
            WireItem::Message(message) => Ok(message),
            other => Err(PipelineError::MalformedEnvelope(format!(
                "pipeline terminated inbound with {}",
                other.description()
            ))),
        }
    }
}
