//! Beacon API - Wire and data models
//!
//! This crate defines:
//! - Component configuration values and kinds
//! - Typed heartbeat messages
//! - The envelope structure the protocol pipeline operates on
//! - The binding registry mapping envelope payloads to typed messages

pub mod binding;
pub mod envelope;
pub mod message;
pub mod model;

// Re-export commonly used types
pub use binding::{Binding, BindingError, BindingManager};
pub use envelope::{Envelope, EnvelopeHeaders, MessagePayload};
pub use message::{HeartbeatAck, HeartbeatRequest, MessageTrait, TypedMessage};
pub use model::{ComponentConfiguration, ComponentKind, HostId};
