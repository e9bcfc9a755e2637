// Security stage
// Signs outbound envelopes and verifies inbound ones with HMAC-SHA256.
// Construction fails when key material is missing or unusable; the pipeline
// builder logs that failure and assembles the chain without this stage.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use beacon_api::envelope::Envelope;

use super::{PipelineError, PipelineStage, WireItem, unexpected};

const STAGE_NAME: &str = "security";

/// Minimum accepted key length in bytes
const MIN_KEY_LEN: usize = 16;

type HmacSha256 = Hmac<Sha256>;

/// Construction-time failure; degrades the pipeline instead of aborting it
#[derive(thiserror::Error, Debug)]
pub enum SecurityUnavailable {
    #[error("no signing key configured")]
    MissingKey,

    #[error("signing key is not valid base64: {0}")]
    InvalidKey(String),

    #[error("signing key too short: {0} bytes, need at least {MIN_KEY_LEN}")]
    WeakKey(usize),
}

/// Per-connection signing state
pub struct SecurityStage {
    key: Vec<u8>,
}

impl SecurityStage {
    pub fn new(key_base64: Option<&str>) -> Result<Self, SecurityUnavailable> {
        let key_base64 = key_base64.ok_or(SecurityUnavailable::MissingKey)?;
        let key = BASE64
            .decode(key_base64)
            .map_err(|e| SecurityUnavailable::InvalidKey(e.to_string()))?;
        if key.len() < MIN_KEY_LEN {
            return Err(SecurityUnavailable::WeakKey(key.len()));
        }
        Ok(Self { key })
    }

    /// The signature covers the type, id, routing headers and body, so no
    /// signed field can change in flight undetected.
    fn signature(&self, envelope: &Envelope) -> Result<String, PipelineError> {
        let body = serde_json::to_string(&envelope.body)
            .map_err(|e| PipelineError::MalformedEnvelope(e.to_string()))?;
        let headers = &envelope.headers;
        let material = format!(
            "{}|{}|{}|{}|{}|{}",
            headers.message_type,
            headers.message_id,
            headers.to,
            headers.from,
            headers.correlation_id.as_deref().unwrap_or(""),
            body
        );

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| PipelineError::MalformedEnvelope(e.to_string()))?;
        mac.update(material.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

impl PipelineStage for SecurityStage {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn encode(&self, item: WireItem) -> Result<WireItem, PipelineError> {
        let WireItem::Envelope(mut envelope) = item else {
            return Err(unexpected(STAGE_NAME, "envelope"));
        };

        envelope.headers.signature = Some(self.signature(&envelope)?);
        Ok(WireItem::Envelope(envelope))
    }

    fn decode(&self, item: WireItem) -> Result<WireItem, PipelineError> {
        let WireItem::Envelope(envelope) = item else {
            return Err(unexpected(STAGE_NAME, "envelope"));
        };

        let presented = envelope
            .headers
            .signature
            .as_deref()
            .ok_or(PipelineError::MissingSignature)?;
        let expected = self.signature(&envelope)?;
        if presented != expected {
            return Err(PipelineError::SignatureMismatch);
        }

        Ok(WireItem::Envelope(envelope))
    }
}
