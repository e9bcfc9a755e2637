// Message serialization stage
// Converts between the serialized body and the parsed envelope
// representation.

use bytes::Bytes;

use beacon_api::envelope::Envelope;

use super::{PipelineError, PipelineStage, WireItem, unexpected};

const STAGE_NAME: &str = "serialization";

pub struct SerializationStage;

impl PipelineStage for SerializationStage {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn encode(&self, item: WireItem) -> Result<WireItem, PipelineError> {
        let WireItem::Envelope(envelope) = item else {
            return Err(unexpected(STAGE_NAME, "envelope"));
        };

        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| PipelineError::MalformedEnvelope(e.to_string()))?;

        Ok(WireItem::Body {
            bytes: Bytes::from(bytes),
            chunked: false,
        })
    }

    fn decode(&self, item: WireItem) -> Result<WireItem, PipelineError> {
        let WireItem::Body { bytes, chunked } = item else {
            return Err(unexpected(STAGE_NAME, "body"));
        };
        if chunked {
            return Err(PipelineError::MalformedFrame(
                "chunked body reached the serialization stage".to_string(),
            ));
        }

        let envelope: Envelope = serde_json::from_slice(&bytes)
            .map_err(|e| PipelineError::MalformedEnvelope(e.to_string()))?;

        Ok(WireItem::Envelope(envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_api::envelope::MessagePayload;
    use serde_json::json;

    #[test]
    fn test_roundtrip() {
        let stage = SerializationStage;
        let envelope = Envelope::wrap(MessagePayload {
            message_type: "HeartbeatAck".to_string(),
            body: json!({"requestId": "r-1", "resultCode": 200}),
        });

        let body = stage.encode(WireItem::Envelope(envelope.clone())).unwrap();
        let back = stage.decode(body).unwrap();
        let WireItem::Envelope(parsed) = back else {
            panic!("expected envelope");
        };
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_garbage_body_rejected() {
        let stage = SerializationStage;
        let err = stage
            .decode(WireItem::Body {
                bytes: Bytes::from_static(b"not json"),
                chunked: false,
            })
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedEnvelope(_)));
    }
}
