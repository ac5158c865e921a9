//! Bus transport seam.
//!
//! The raw transport (connect, subscribe, publish, delivery guarantees) is an
//! external collaborator; units depend on [`BusTransport`] only. The
//! in-memory implementation in [`memory`] backs tests and single-process
//! deployments.

use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod memory;

pub use memory::InMemoryBus;

/// A message delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// The concrete topic the message was published on.
    pub topic: String,
    /// The raw body bytes.
    pub payload: Vec<u8>,
}

/// Receiving side of a subscription.
///
/// Delivery is at-least-once with no ordering guarantee across topics.
#[derive(Debug)]
pub struct BusSubscription {
    rx: mpsc::Receiver<BusMessage>,
}

impl BusSubscription {
    pub(crate) fn new(rx: mpsc::Receiver<BusMessage>) -> Self {
        Self { rx }
    }

    /// Waits for the next message. Returns `None` once the transport has
    /// shut down and the backlog is drained.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }
}

/// Publish/subscribe transport used by every unit.
///
/// Used as `Arc<dyn BusTransport>` so units and clients share one
/// connection.
#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Publishes a payload to a topic. Fire-and-forget: delivery to any
    /// particular subscriber is not acknowledged.
    ///
    /// # Errors
    ///
    /// Returns an error only when the transport itself rejects the publish
    /// (e.g. connection lost); "nobody is listening" is not an error.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()>;

    /// Subscribes to a set of topic patterns.
    ///
    /// Patterns are exact topic names or MQTT-style wildcards: `#` alone
    /// matches every topic, a trailing `/#` matches the whole subtree.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport cannot register the
    /// subscription.
    async fn subscribe(&self, patterns: &[String]) -> anyhow::Result<BusSubscription>;
}
