//! Envelope structure carried over the wire
//!
//! An [`Envelope`] wraps one message payload together with the routing,
//! correlation and signature metadata the addressing and security stages
//! operate on. On the wire it serializes to a single JSON document with a
//! `headers` and a `body` section.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Routing and correlation metadata attached to an envelope
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeHeaders {
    /// Type name of the payload message
    pub message_type: String,
    /// Unique id of this envelope, assigned by the addressing stage
    #[serde(default)]
    pub message_id: String,
    /// Id of the envelope this one responds to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Destination address
    #[serde(default)]
    pub to: String,
    /// Source address
    #[serde(default)]
    pub from: String,
    /// Base64 HMAC signature over the body, set by the security stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Free-form extension headers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extensions: HashMap<String, String>,
}

/// One message payload plus its metadata
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub headers: EnvelopeHeaders,
    pub body: Value,
}

impl Envelope {
    /// Wrap a payload in a fresh envelope with only the type header set.
    ///
    /// Routing metadata is attached later by the addressing stage.
    pub fn wrap(payload: MessagePayload) -> Self {
        Self {
            headers: EnvelopeHeaders {
                message_type: payload.message_type,
                ..Default::default()
            },
            body: payload.body,
        }
    }

    /// Unwrap the payload, dropping routing metadata.
    pub fn unwrap_payload(self) -> MessagePayload {
        MessagePayload {
            message_type: self.headers.message_type,
            body: self.body,
        }
    }
}

/// Generic payload the binding stage converts to/from typed messages
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub message_type: String,
    pub body: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrap_unwrap() {
        let payload = MessagePayload {
            message_type: "HeartbeatRequest".to_string(),
            body: json!({"requestId": "r-1"}),
        };

        let envelope = Envelope::wrap(payload.clone());
        assert_eq!(envelope.headers.message_type, "HeartbeatRequest");
        assert!(envelope.headers.message_id.is_empty());

        let unwrapped = envelope.unwrap_payload();
        assert_eq!(unwrapped, payload);
    }

    #[test]
    fn test_envelope_serialization_skips_empty() {
        let envelope = Envelope::wrap(MessagePayload {
            message_type: "HeartbeatAck".to_string(),
            body: json!({}),
        });

        let text = serde_json::to_string(&envelope).unwrap();
        assert!(!text.contains("signature"));
        assert!(!text.contains("correlationId"));
        assert!(!text.contains("extensions"));

        let parsed: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.headers.message_type, "HeartbeatAck");
    }
}
