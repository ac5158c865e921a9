//! In-memory [`BusTransport`] implementation.
//!
//! Single-process stand-in for a real broker. Each subscriber gets a bounded
//! mpsc channel; publishing fans out to every subscriber whose pattern set
//! matches the topic. A slow subscriber whose channel fills up loses
//! messages (with a warning) rather than blocking publishers, which mirrors
//! the at-least-once, no-backpressure contract of the external broker.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{BusMessage, BusSubscription, BusTransport};

/// Outbound channel capacity per subscriber.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

struct Subscriber {
    patterns: Vec<String>,
    tx: mpsc::Sender<BusMessage>,
}

/// In-memory pub/sub bus over per-subscriber bounded channels.
pub struct InMemoryBus {
    subscribers: DashMap<u64, Subscriber>,
    next_id: AtomicU64,
}

impl InMemoryBus {
    /// Creates a new bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `true` if `pattern` matches `topic`.
///
/// `#` matches everything; `prefix/#` matches `prefix` and its subtree;
/// anything else is an exact match.
fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern == "#" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/#") {
        return topic == prefix
            || topic
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'));
    }
    pattern == topic
}

#[async_trait]
impl BusTransport for InMemoryBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        let mut delivered = 0_usize;
        let mut dead = Vec::new();

        for entry in self.subscribers.iter() {
            if !entry.patterns.iter().any(|p| topic_matches(p, topic)) {
                continue;
            }
            let msg = BusMessage {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            match entry.tx.try_send(msg) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(topic, subscriber = *entry.key(), "subscriber lagging, message dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(*entry.key());
                }
            }
        }

        for id in dead {
            self.subscribers.remove(&id);
        }

        if delivered == 0 {
            warn!(topic, "message dropped (no receivers)");
        } else {
            debug!(topic, receivers = delivered, "message published");
        }
        Ok(())
    }

    async fn subscribe(&self, patterns: &[String]) -> anyhow::Result<BusSubscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(
            id,
            Subscriber {
                patterns: patterns.to_vec(),
                tx,
            },
        );
        debug!(subscriber = id, ?patterns, "subscription created");
        Ok(BusSubscription::new(rx))
    }
}
