// Addressing stage
// Attaches routing and correlation metadata to outbound envelopes and
// validates it on inbound ones.

use super::{PipelineError, PipelineStage, WireItem, unexpected};

const STAGE_NAME: &str = "addressing";

pub struct AddressingStage {
    local_address: String,
    peer_address: String,
}

impl AddressingStage {
    pub fn new(local_address: String, peer_address: String) -> Self {
        Self {
            local_address,
            peer_address,
        }
    }
}

impl PipelineStage for AddressingStage {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn encode(&self, item: WireItem) -> Result<WireItem, PipelineError> {
        let WireItem::Envelope(mut envelope) = item else {
            return Err(unexpected(STAGE_NAME, "envelope"));
        };

        envelope.headers.message_id = uuid::Uuid::new_v4().to_string();
        envelope.headers.to = self.peer_address.clone();
        envelope.headers.from = self.local_address.clone();

        Ok(WireItem::Envelope(envelope))
    }

    fn decode(&self, item: WireItem) -> Result<WireItem, PipelineError> {
        let WireItem::Envelope(envelope) = item else {
            return Err(unexpected(STAGE_NAME, "envelope"));
        };

        if envelope.headers.message_id.is_empty() {
            return Err(PipelineError::Addressing(
                "inbound envelope carries no message id".to_string(),
            ));
        }
        if envelope.headers.from.is_empty() {
            return Err(PipelineError::Addressing(
                "inbound envelope carries no source address".to_string(),
            ));
        }

        Ok(WireItem::Envelope(envelope))
    }
}
