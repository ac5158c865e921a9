//! Bus-backed poller: degraded correlation on a business key.
//!
//! Used where a caller cannot block on a dedicated response topic because
//! several independent browser-facing requests share one underlying owner id
//! and the protocol carries no per-request correlation id. Responses are
//! written into a shared context table keyed by session id, and the caller
//! spin-waits with a fixed sleep interval until data appears or a deadline
//! passes.
//!
//! Strictly weaker than the correlation client: no per-call id, possible
//! cross-talk between concurrent callers sharing an owner id, and added
//! latency bounded by the poll interval. Callers needing strict isolation
//! should use [`CorrelationClient`](crate::correlate::CorrelationClient).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use partyline_core::messages::{SessionInfo, SessionQuery, StateGet, StateValue, Status};
use partyline_core::{ClockSource, Envelope, Topic};
use serde_json::Value;
use tracing::{info, warn};

use crate::bus::BusTransport;
use crate::error::RequestError;
use crate::unit::UnitHandler;

/// Result of a completed two-stage view fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewData {
    /// Owner resolved from the session.
    pub user_id: String,
    /// The fetched value (null when the key was absent).
    pub value: Value,
}

/// Per-request scratch state, one per outstanding browser-facing request.
#[derive(Debug, Default)]
struct PollContext {
    user_id: Option<String>,
    auth_status: Option<Status>,
    db_data: Option<Value>,
    query_sent: bool,
    completed: bool,
}

/// Two-stage session-then-data fetcher over the shared context table.
pub struct BusPoller {
    bus: Arc<dyn BusTransport>,
    clock: Arc<dyn ClockSource>,
    contexts: Mutex<HashMap<String, PollContext>>,
    poll_interval: Duration,
}

impl BusPoller {
    /// Creates a poller. `poll_interval` bounds both the added latency and
    /// the CPU cost of the spin-wait.
    #[must_use]
    pub fn new(
        bus: Arc<dyn BusTransport>,
        clock: Arc<dyn ClockSource>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            bus,
            clock,
            contexts: Mutex::new(HashMap::new()),
            poll_interval,
        }
    }

    /// Resolves `session_id` to its owner, then fetches `key` for that
    /// owner, within `deadline`.
    ///
    /// The second-stage fetch is dispatched exactly once, as soon as the
    /// identity resolves valid. On the deadline the context is deleted and
    /// the caller gets [`RequestError::Unauthorized`] (status 403), which
    /// covers both an invalid session and a data fetch that never answered.
    /// Dropping the returned future deletes the context with no further bus
    /// traffic.
    ///
    /// # Errors
    ///
    /// [`RequestError::Unauthorized`] on deadline, [`RequestError::Bus`]
    /// when a publish fails.
    pub async fn fetch_view(
        &self,
        session_id: &str,
        key: &str,
        deadline: Duration,
    ) -> Result<ViewData, RequestError> {
        self.contexts
            .lock()
            .insert(session_id.to_string(), PollContext::default());
        let _guard = ContextGuard {
            contexts: &self.contexts,
            session_id,
        };

        let query = SessionQuery {
            session_id: session_id.to_string(),
        };
        let envelope = Envelope::build(&query, self.clock.as_ref())?;
        self.bus
            .publish(Topic::SessionQuery.wire(), envelope.encode())
            .await?;

        let give_up = tokio::time::Instant::now() + deadline;
        while tokio::time::Instant::now() < give_up {
            let second_stage = {
                let mut contexts = self.contexts.lock();
                let Some(ctx) = contexts.get_mut(session_id) else {
                    break;
                };
                if ctx.completed {
                    let user_id = ctx.user_id.clone().unwrap_or_default();
                    let value = ctx.db_data.take().unwrap_or(Value::Null);
                    return Ok(ViewData { user_id, value });
                }
                if ctx.auth_status == Some(Status::Valid)
                    && ctx.user_id.is_some()
                    && !ctx.query_sent
                {
                    ctx.query_sent = true;
                    ctx.user_id.clone()
                } else {
                    None
                }
            };

            if let Some(user_id) = second_stage {
                info!(session_id, user_id = %user_id, key, "identity resolved, fetching data");
                let get = StateGet::new(user_id, key);
                let envelope = Envelope::build(&get, self.clock.as_ref())?;
                self.bus
                    .publish(Topic::StateGet.wire(), envelope.encode())
                    .await?;
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        Err(RequestError::Unauthorized)
    }

    /// Number of outstanding poll contexts.
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.contexts.lock().len()
    }

    fn on_session_info(&self, envelope: &Envelope) {
        let info: SessionInfo = match envelope.payload() {
            Ok(info) => info,
            Err(err) => {
                warn!(%err, "dropping malformed session info");
                return;
            }
        };
        let mut contexts = self.contexts.lock();
        if let Some(ctx) = contexts.get_mut(&info.session_id) {
            ctx.user_id = info.user_id;
            ctx.auth_status = Some(info.status);
            info!(session_id = %info.session_id, "identity response recorded");
        }
    }

    fn on_state_value(&self, envelope: &Envelope) {
        let value: StateValue = match envelope.payload() {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, "dropping malformed state value");
                return;
            }
        };
        // Several contexts can share one owner id; every one of them gets
        // this response, not just the first match.
        let mut contexts = self.contexts.lock();
        for ctx in contexts
            .values_mut()
            .filter(|ctx| ctx.user_id.as_deref() == Some(value.user_id.as_str()))
        {
            ctx.db_data = Some(value.value.clone());
            ctx.completed = true;
        }
    }
}

#[async_trait]
impl UnitHandler for BusPoller {
    fn subscriptions(&self) -> Vec<String> {
        vec![
            Topic::SessionInfo.wire().to_string(),
            Topic::StateValue.wire().to_string(),
        ]
    }

    async fn handle(&self, topic: Topic, envelope: Envelope) {
        match topic {
            Topic::SessionInfo => self.on_session_info(&envelope),
            Topic::StateValue => self.on_state_value(&envelope),
            _ => {}
        }
    }
}

/// Deletes the poll context when the owning fetch exits by any path.
struct ContextGuard<'a> {
    contexts: &'a Mutex<HashMap<String, PollContext>>,
    session_id: &'a str,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.contexts.lock().remove(self.session_id);
    }
}
