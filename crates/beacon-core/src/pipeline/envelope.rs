// Envelope construction stage
// Wraps the generic payload in the envelope structure outbound and unwraps
// it inbound.

use super::{PipelineError, PipelineStage, WireItem, unexpected};

use beacon_api::envelope::Envelope;

const STAGE_NAME: &str = "envelope";

pub struct EnvelopeStage;

impl PipelineStage for EnvelopeStage {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn encode(&self, item: WireItem) -> Result<WireItem, PipelineError> {
        let WireItem::Payload(payload) = item else {
            return Err(unexpected(STAGE_NAME, "payload"));
        };
        Ok(WireItem::Envelope(Envelope::wrap(payload)))
    }

    fn decode(&self, item: WireItem) -> Result<WireItem, PipelineError> {
        let WireItem::Envelope(envelope) = item else {
            return Err(unexpected(STAGE_NAME, "envelope"));
        };
        if envelope.headers.message_type.is_empty() {
            return Err(PipelineError::MalformedEnvelope(
                "envelope carries no message type".to_string(),
            ));
        }
        Ok(WireItem::Payload(envelope.unwrap_payload()))
    }
}
