// Binding stage
// Converts between the generic envelope payload and concrete typed messages,
// using the binding selected at pipeline construction.

use beacon_api::binding::Binding;

use super::{PipelineError, PipelineStage, WireItem, unexpected};

const STAGE_NAME: &str = "binding";

pub struct BindingStage {
    binding: Binding,
}

impl BindingStage {
    pub fn new(binding: Binding) -> Self {
        Self { binding }
    }
}

impl PipelineStage for BindingStage {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn encode(&self, item: WireItem) -> Result<WireItem, PipelineError> {
        let WireItem::Message(message) = item else {
            return Err(unexpected(STAGE_NAME, "message"));
        };
        let payload = self.binding.to_payload(&message)?;
        Ok(WireItem::Payload(payload))
    }

    fn decode(&self, item: WireItem) -> Result<WireItem, PipelineError> {
        let WireItem::Payload(payload) = item else {
            return Err(unexpected(STAGE_NAME, "payload"));
        };
        let message = self.binding.from_payload(&payload)?;
        Ok(WireItem::Message(message))
    }
}
