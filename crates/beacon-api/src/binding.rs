//! Binding registry
//!
//! A [`Binding`] maps between generic envelope payloads and concrete typed
//! messages for one named message schema. The binding name is fixed at
//! pipeline construction and selects which schema a connection speaks.

use beacon_common::COMPONENT_BINDING;

use crate::envelope::MessagePayload;
use crate::message::{HeartbeatAck, HeartbeatRequest, TypedMessage};

/// Errors raised while binding payloads to typed messages
#[derive(thiserror::Error, Debug)]
pub enum BindingError {
    #[error("unknown binding '{0}'")]
    UnknownBinding(String),

    #[error("unknown message type '{0}' for binding '{1}'")]
    UnknownMessageType(String, String),

    #[error("malformed message body for '{0}': {1}")]
    MalformedBody(String, String),
}

/// Conversion between envelope payloads and typed messages for one schema
#[derive(Clone, Debug)]
pub struct Binding {
    name: &'static str,
}

impl Binding {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Convert a typed message into a generic payload.
    pub fn to_payload(&self, message: &TypedMessage) -> Result<MessagePayload, BindingError> {
        let body = match message {
            TypedMessage::Heartbeat(m) => serde_json::to_value(m),
            TypedMessage::Ack(m) => serde_json::to_value(m),
        }
        .map_err(|e| BindingError::MalformedBody(message.message_type().to_string(), e.to_string()))?;

        Ok(MessagePayload {
            message_type: message.message_type().to_string(),
            body,
        })
    }

    /// Convert a generic payload back into a typed message.
    pub fn from_payload(&self, payload: &MessagePayload) -> Result<TypedMessage, BindingError> {
        match payload.message_type.as_str() {
            "HeartbeatRequest" => serde_json::from_value::<HeartbeatRequest>(payload.body.clone())
                .map(TypedMessage::Heartbeat)
                .map_err(|e| {
                    BindingError::MalformedBody(payload.message_type.clone(), e.to_string())
                }),
            "HeartbeatAck" => serde_json::from_value::<HeartbeatAck>(payload.body.clone())
                .map(TypedMessage::Ack)
                .map_err(|e| {
                    BindingError::MalformedBody(payload.message_type.clone(), e.to_string())
                }),
            other => Err(BindingError::UnknownMessageType(
                other.to_string(),
                self.name.to_string(),
            )),
        }
    }
}

/// Registry of known bindings
pub struct BindingManager;

impl BindingManager {
    /// Look up a binding by its fixed name.
    pub fn get(name: &str) -> Result<Binding, BindingError> {
        match name {
            COMPONENT_BINDING => Ok(Binding {
                name: COMPONENT_BINDING,
            }),
            other => Err(BindingError::UnknownBinding(other.to_string())),
        }
    }
}
