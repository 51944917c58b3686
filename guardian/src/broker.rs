use anyhow::Result;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use log::{debug, warn};

use crate::messages::BrokerMessage;

/// Default bus topic guardian payloads are published under.
pub const BROKER_TOPIC: &str = "defender";

/// Outbound seam to the message bus.
///
/// Publication is fire-and-forget: a failed publish is the transport's
/// problem to report, never a reason to abort the cycle that produced the
/// message.
pub trait MessageBroker: Send + Sync {
    fn publish(&self, message: &BrokerMessage) -> Result<()>;
}

/// Broker that hands serialized payloads to an in-process channel. The
/// binary drains the channel into the configured transport; tests drain it
/// directly to observe emitted messages.
pub struct ChannelBroker {
    topic: String,
    tx: UnboundedSender<PublishedMessage>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
}

impl ChannelBroker {
    #[must_use]
    pub fn new(topic: impl Into<String>) -> (Self, UnboundedReceiver<PublishedMessage>) {
        let (tx, rx) = mpsc::unbounded();

        (
            Self {
                topic: topic.into(),
                tx,
            },
            rx,
        )
    }
}

impl MessageBroker for ChannelBroker {
    fn publish(&self, message: &BrokerMessage) -> Result<()> {
        let payload = serde_json::to_string(message)?;

        debug!("publishing {} message to topic {}", message.kind(), self.topic);

        if let Err(error) = self.tx.unbounded_send(PublishedMessage {
            topic: self.topic.clone(),
            payload,
        }) {
            warn!("message bus receiver is gone: {error}");
        }

        Ok(())
    }
}
