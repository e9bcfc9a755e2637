// Terminal dispatch stage
// Inbound end of the pipeline: forwards decoded typed messages to the
// broadcaster's event handling. Any failure observed here is fatal for the
// owning connection and is never retried. The outbound terminal (writing
// frames to the transport) lives in the connection I/O task.

use tokio::sync::mpsc;
use tracing::error;

use beacon_api::message::TypedMessage;
use beacon_api::model::HostId;

/// A decoded message attributed to the peer it arrived from
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub host: HostId,
    pub message: TypedMessage,
}

/// Forwards decoded inbound messages to the broadcaster
pub struct InboundDispatcher {
    host: HostId,
    inbound_tx: mpsc::Sender<InboundMessage>,
}

impl InboundDispatcher {
    pub fn new(host: HostId, inbound_tx: mpsc::Sender<InboundMessage>) -> Self {
        Self { host, inbound_tx }
    }

    /// Hand a decoded message to the broadcaster.
    ///
    /// Returns false when the broadcaster side is gone; the caller must treat
    /// that as fatal and close the connection.
    pub async fn dispatch(&self, message: TypedMessage) -> bool {
        let inbound = InboundMessage {
            host: self.host.clone(),
            message,
        };
        if self.inbound_tx.send(inbound).await.is_err() {
            error!(
                "Inbound dispatch for {} failed: broadcaster receiver dropped",
                self.host
            );
            return false;
        }
        true
    }
}
