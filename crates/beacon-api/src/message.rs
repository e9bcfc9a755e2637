//! Typed heartbeat messages
//!
//! Request/ack models exchanged between the broadcaster and storage-tier
//! peers. These are the values the binding stage converts envelope payloads
//! to and from.

use serde::{Deserialize, Serialize};

use crate::model::{ComponentConfiguration, HostId};

/// Base trait for all typed messages
pub trait MessageTrait {
    fn message_type(&self) -> &'static str;

    fn message_id(&self) -> &str;
}

/// Heartbeat request carrying the topology snapshot for one peer
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub request_id: String,
    /// Address of the broadcasting controller
    pub origin: HostId,
    /// Host the snapshot is addressed to
    pub target_host: HostId,
    /// Configurations currently registered for the target host
    pub components: Vec<ComponentConfiguration>,
    /// Millisecond timestamp at send time
    pub timestamp: i64,
}

impl HeartbeatRequest {
    pub fn new(origin: HostId, target_host: HostId, components: Vec<ComponentConfiguration>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            origin,
            target_host,
            components,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl MessageTrait for HeartbeatRequest {
    fn message_type(&self) -> &'static str {
        "HeartbeatRequest"
    }

    fn message_id(&self) -> &str {
        &self.request_id
    }
}

/// Ack a peer returns for a received heartbeat
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    pub request_id: String,
    pub result_code: i32,
    pub message: String,
}

impl HeartbeatAck {
    pub fn success(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            result_code: 200,
            message: String::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result_code == 200
    }
}

impl MessageTrait for HeartbeatAck {
    fn message_type(&self) -> &'static str {
        "HeartbeatAck"
    }

    fn message_id(&self) -> &str {
        &self.request_id
    }
}

/// Tagged variant over every message the binding knows about
///
/// Exhaustive matching on this enum replaces runtime type inspection at
/// dispatch points.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedMessage {
    Heartbeat(HeartbeatRequest),
    Ack(HeartbeatAck),
}

impl TypedMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            TypedMessage::Heartbeat(m) => m.message_type(),
            TypedMessage::Ack(m) => m.message_type(),
        }
    }

    pub fn message_id(&self) -> &str {
        match self {
            TypedMessage::Heartbeat(m) => m.message_id(),
            TypedMessage::Ack(m) => m.message_id(),
        }
    }
}
