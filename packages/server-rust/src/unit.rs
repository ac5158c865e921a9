//! Unit runtime: a single dispatcher task per unit.
//!
//! Each unit runs exactly one bus-listener execution context. The dispatcher
//! pulls from the subscription stream, decodes envelopes (malformed input is
//! dropped and logged, never fatal), routes by catalogued topic, and selects
//! on the shutdown signal. Caller execution contexts suspend elsewhere
//! (correlation calls, redirect waits, poll loops), never here.

use std::sync::Arc;

use async_trait::async_trait;
use partyline_core::envelope::CORRELATION_FIELD;
use partyline_core::{ClockSource, Envelope, Topic};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::bus::BusTransport;

/// A unit's message-handling half.
///
/// Handlers are invoked from the unit's single dispatcher task. They must be
/// short and non-blocking: mutate shared state and optionally publish, but
/// never wait on a bus round trip.
#[async_trait]
pub trait UnitHandler: Send + Sync {
    /// Topic patterns this unit subscribes to.
    fn subscriptions(&self) -> Vec<String>;

    /// Handles one decoded envelope.
    async fn handle(&self, topic: Topic, envelope: Envelope);
}

/// Subscribes the handler and spawns its dispatcher task.
///
/// The subscription is registered before this returns, so anything published
/// afterwards is seen by the handler. The task exits when the shutdown
/// signal fires or the transport closes.
///
/// # Errors
///
/// Returns an error if the transport cannot register the subscription.
pub async fn spawn_unit(
    bus: Arc<dyn BusTransport>,
    handler: Arc<dyn UnitHandler>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<JoinHandle<()>> {
    let mut sub = bus.subscribe(&handler.subscriptions()).await?;
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = sub.recv() => {
                    let Some(msg) = msg else { break };
                    let envelope = match Envelope::decode(&msg.payload) {
                        Ok(env) => env,
                        Err(err) => {
                            warn!(topic = %msg.topic, %err, "dropping malformed payload");
                            continue;
                        }
                    };
                    let Some(topic) = Topic::parse(&msg.topic) else {
                        debug!(topic = %msg.topic, "message on uncatalogued topic ignored");
                        continue;
                    };
                    handler.handle(topic, envelope).await;
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("unit dispatcher stopped");
    }))
}

/// Publishes a response payload for a received request, echoing the
/// request's correlation id when one is present.
///
/// Failures are logged, never propagated: the bus has no sender to report
/// back to, and a handler must not fail its dispatcher.
pub async fn publish_reply<T: Serialize>(
    bus: &dyn BusTransport,
    clock: &dyn ClockSource,
    topic: Topic,
    payload: &T,
    request: &Envelope,
) {
    let mut envelope = match Envelope::build(payload, clock) {
        Ok(envelope) => envelope,
        Err(err) => {
            error!(%err, "response payload did not serialize");
            return;
        }
    };
    if let Some(id) = request.get_str(CORRELATION_FIELD) {
        envelope.insert(CORRELATION_FIELD, Value::String(id.to_string()));
    }
    if let Err(err) = bus.publish(topic.wire(), envelope.encode()).await {
        error!(%err, topic = topic.wire(), "failed to publish response");
    }
}
