//! Correlation client: reliable point-to-point request/response over the
//! fire-and-forget broadcast bus.
//!
//! Each client owns a dedicated response topic (`partyline/<unit>/response`)
//! and a table of pending requests keyed by correlation id. One listener
//! task per client is the single writer that fulfills entries; fulfillment
//! is an atomic remove-then-send, so an entry can neither be completed twice
//! nor removed while a fulfillment is in flight. Responses for ids no longer
//! tracked (already timed out or abandoned) are discarded silently.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use partyline_core::envelope::CORRELATION_FIELD;
use partyline_core::topics::{request_topic, response_topic};
use partyline_core::{ClockSource, Envelope};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::BusTransport;
use crate::error::RequestError;

/// Length of the hex correlation id. Eight hex chars give a 2^32 token
/// space, plenty for uniqueness among concurrently pending requests (which
/// is additionally enforced against the pending table at registration).
const CORRELATION_ID_LEN: usize = 8;

type PendingTable = DashMap<String, oneshot::Sender<Envelope>>;

/// Issues tagged requests and suspends callers until the matching response
/// arrives or a timeout elapses.
pub struct CorrelationClient {
    bus: Arc<dyn BusTransport>,
    unit_name: String,
    clock: Arc<dyn ClockSource>,
    pending: Arc<PendingTable>,
    listener: JoinHandle<()>,
}

impl CorrelationClient {
    /// Subscribes to the unit's response topic and starts the listener task.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot register the subscription.
    pub async fn connect(
        bus: Arc<dyn BusTransport>,
        unit_name: impl Into<String>,
        clock: Arc<dyn ClockSource>,
    ) -> anyhow::Result<Self> {
        let unit_name = unit_name.into();
        let pending: Arc<PendingTable> = Arc::new(DashMap::new());

        let mut sub = bus.subscribe(&[response_topic(&unit_name)]).await?;
        let table = Arc::clone(&pending);
        let listener = tokio::spawn(async move {
            while let Some(msg) = sub.recv().await {
                let envelope = match Envelope::decode(&msg.payload) {
                    Ok(env) => env,
                    Err(err) => {
                        warn!(topic = %msg.topic, %err, "dropping malformed response");
                        continue;
                    }
                };
                let Some(id) = envelope.get_str(CORRELATION_FIELD).map(str::to_string) else {
                    debug!(topic = %msg.topic, "response without correlation id discarded");
                    continue;
                };
                match table.remove(&id) {
                    Some((_, tx)) => {
                        // The waiter may have just abandoned the call; a
                        // failed send is equivalent to a discarded response.
                        let _ = tx.send(envelope);
                    }
                    None => debug!(id, "response for untracked id discarded"),
                }
            }
        });

        Ok(Self {
            bus,
            unit_name,
            clock,
            pending,
            listener,
        })
    }

    /// Publishes `{id, ...request}` to `topic` and waits for the response
    /// tagged with the same id on this unit's response topic.
    ///
    /// On timeout the pending entry is released and the caller gets
    /// [`RequestError::Timeout`] (status 408), distinguishable from any
    /// answered-negatively response. Abandoning the returned future releases
    /// the entry with no further bus traffic.
    ///
    /// # Errors
    ///
    /// [`RequestError::Timeout`] when no response arrives in time,
    /// [`RequestError::Malformed`] when `request` does not serialize to a
    /// JSON object, [`RequestError::Bus`] when the publish itself fails.
    pub async fn call<T: Serialize>(
        &self,
        topic: &str,
        request: &T,
        timeout: Duration,
    ) -> Result<Envelope, RequestError> {
        let mut envelope = Envelope::build(request, self.clock.as_ref())?;
        let (id, rx) = self.register();
        envelope.insert(CORRELATION_FIELD, Value::String(id.clone()));

        // Removes the entry on every exit path; fulfillment has already
        // removed it by the time the receiver resolves.
        let _guard = PendingGuard {
            pending: &self.pending,
            id: &id,
        };

        self.bus.publish(topic, envelope.encode()).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RequestError::Disconnected),
            Err(_) => Err(RequestError::Timeout { timeout }),
        }
    }

    /// Method-style read: publishes to `partyline/<unit>/GET`.
    ///
    /// # Errors
    ///
    /// Same contract as [`CorrelationClient::call`].
    pub async fn get(&self, key: &str, timeout: Duration) -> Result<Envelope, RequestError> {
        self.call(
            &request_topic(&self.unit_name, "GET"),
            &MethodRequest { key, value: None },
            timeout,
        )
        .await
    }

    /// Method-style write: publishes to `partyline/<unit>/POST`.
    ///
    /// # Errors
    ///
    /// Same contract as [`CorrelationClient::call`].
    pub async fn post(
        &self,
        key: &str,
        value: &Value,
        timeout: Duration,
    ) -> Result<Envelope, RequestError> {
        self.call(
            &request_topic(&self.unit_name, "POST"),
            &MethodRequest {
                key,
                value: Some(value),
            },
            timeout,
        )
        .await
    }

    /// The unit name this client answers for.
    #[must_use]
    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Allocates a correlation id unused among currently pending entries and
    /// registers its wait channel in one atomic step.
    fn register(&self) -> (String, oneshot::Receiver<Envelope>) {
        loop {
            let mut id = Uuid::new_v4().simple().to_string();
            id.truncate(CORRELATION_ID_LEN);
            if let Entry::Vacant(slot) = self.pending.entry(id.clone()) {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                return (id, rx);
            }
        }
    }
}

impl Drop for CorrelationClient {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Request body for the method-style `get`/`post` API.
#[derive(Serialize)]
struct MethodRequest<'a> {
    key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a Value>,
}

/// Releases a pending entry when the owning call exits by any path.
struct PendingGuard<'a> {
    pending: &'a PendingTable,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}
