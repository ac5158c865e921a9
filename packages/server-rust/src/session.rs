//! Session coordinator unit.
//!
//! Holds the authoritative session-to-identity bindings and answers
//! session-query requests. Also brokers the app-ready handshake: downstream
//! units announce a prepared destination, and a waiting front end consumes
//! it via [`SessionCoordinator::await_redirect`].
//!
//! Sessions live in memory only and end at process restart; there is no
//! expiry or logout propagation in this core. The ready-redirect table is a
//! single-slot mailbox per session: a second announcement before the first
//! is consumed overwrites it (last wins).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use partyline_core::messages::{AuthSuccess, SessionInfo, SessionQuery};
use partyline_core::topics::session_coordinator_topics;
use partyline_core::{ClockSource, Envelope, Topic};
use tokio::sync::Notify;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::BusTransport;
use crate::unit::{publish_reply, UnitHandler};

/// Identity bound to a session id at authentication time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub user_id: String,
    pub role: String,
}

/// Authoritative session state and the app-ready handshake broker.
pub struct SessionCoordinator {
    bus: Arc<dyn BusTransport>,
    clock: Arc<dyn ClockSource>,
    sessions: DashMap<String, SessionRecord>,
    ready: Mutex<HashMap<String, String>>,
    ready_notify: Notify,
}

impl SessionCoordinator {
    /// Creates a coordinator with empty tables.
    #[must_use]
    pub fn new(bus: Arc<dyn BusTransport>, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            bus,
            clock,
            sessions: DashMap::new(),
            ready: Mutex::new(HashMap::new()),
            ready_notify: Notify::new(),
        }
    }

    /// Mints a fresh session for a successfully authenticated user, stores
    /// the binding, and publishes the auth-success event.
    ///
    /// Called exactly once per successful login; concurrent logins produce
    /// independent sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the auth-success event cannot be published. The
    /// session is registered either way, so a cookie handed to the browser
    /// stays valid.
    pub async fn authenticate(&self, user_id: &str, role: &str) -> anyhow::Result<String> {
        let session_id = Uuid::new_v4().to_string();
        self.sessions.insert(
            session_id.clone(),
            SessionRecord {
                user_id: user_id.to_string(),
                role: role.to_string(),
            },
        );
        info!(user_id, session_id = %session_id, "session created");

        let event = AuthSuccess {
            user_id: user_id.to_string(),
            session_id: session_id.clone(),
            role: role.to_string(),
        };
        let envelope = Envelope::build(&event, self.clock.as_ref())?;
        self.bus
            .publish(Topic::AuthSuccess.wire(), envelope.encode())
            .await?;
        Ok(session_id)
    }

    /// Looks up the identity bound to a session id.
    #[must_use]
    pub fn lookup(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.get(session_id).map(|r| r.clone())
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Waits until a ready-redirect record exists for `session_id`, consumes
    /// it, and returns the destination URL. `None` on deadline.
    ///
    /// Consumption is read-once: the record is deleted as it is returned.
    /// Dropping the returned future (caller disconnect) has no side effects;
    /// an unconsumed record stays for the next waiter.
    pub async fn await_redirect(&self, session_id: &str, deadline: Duration) -> Option<String> {
        tokio::time::timeout(deadline, async {
            loop {
                let notified = self.ready_notify.notified();
                tokio::pin!(notified);
                // Register interest before checking, so an announcement
                // landing between the check and the await is not missed.
                notified.as_mut().enable();
                if let Some(url) = self.ready.lock().remove(session_id) {
                    return url;
                }
                notified.await;
            }
        })
        .await
        .ok()
    }

    /// Number of unconsumed ready-redirect records.
    #[must_use]
    pub fn pending_redirects(&self) -> usize {
        self.ready.lock().len()
    }

    async fn on_session_query(&self, request: &Envelope) {
        let query: SessionQuery = match request.payload() {
            Ok(query) => query,
            Err(err) => {
                warn!(%err, "dropping malformed session query");
                return;
            }
        };
        info!(session_id = %query.session_id, "session query received");

        let response = match self.lookup(&query.session_id) {
            Some(record) => SessionInfo::valid(&query.session_id, &record.user_id, &record.role),
            None => SessionInfo::invalid(&query.session_id),
        };
        publish_reply(
            self.bus.as_ref(),
            self.clock.as_ref(),
            Topic::SessionInfo,
            &response,
            request,
        )
        .await;
    }

    fn on_app_ready(&self, envelope: &Envelope) {
        // A notification missing either field is ignored silently.
        let (Some(session_id), Some(url)) = (
            envelope.get_str("session_id"),
            envelope.get_str("redirect_url"),
        ) else {
            return;
        };
        info!(session_id, url, "session ready to redirect");
        self.ready
            .lock()
            .insert(session_id.to_string(), url.to_string());
        self.ready_notify.notify_waiters();
    }
}

#[async_trait]
impl UnitHandler for SessionCoordinator {
    fn subscriptions(&self) -> Vec<String> {
        session_coordinator_topics()
    }

    async fn handle(&self, topic: Topic, envelope: Envelope) {
        match topic {
            Topic::SessionQuery => self.on_session_query(&envelope).await,
            Topic::AppReady => self.on_app_ready(&envelope),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use partyline_core::messages::Status;
    use partyline_core::SystemClock;
    use serde_json::json;

    use super::*;
    use crate::bus::InMemoryBus;

    fn coordinator(bus: &Arc<InMemoryBus>) -> SessionCoordinator {
        SessionCoordinator::new(
            Arc::clone(bus) as Arc<dyn BusTransport>,
            Arc::new(SystemClock),
        )
    }

    fn envelope_from(value: &serde_json::Value) -> Envelope {
        Envelope::decode(&serde_json::to_vec(value).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn authenticate_publishes_auth_success() {
        let bus = Arc::new(InMemoryBus::new());
        let mut events = bus
            .subscribe(&[Topic::AuthSuccess.wire().to_string()])
            .await
            .unwrap();
        let coord = coordinator(&bus);

        let session_id = coord.authenticate("u1", "admin").await.unwrap();

        let msg = events.recv().await.unwrap();
        let event: AuthSuccess = Envelope::decode(&msg.payload).unwrap().payload().unwrap();
        assert_eq!(event.user_id, "u1");
        assert_eq!(event.role, "admin");
        assert_eq!(event.session_id, session_id);
    }

    #[tokio::test]
    async fn concurrent_logins_produce_independent_sessions() {
        let bus = Arc::new(InMemoryBus::new());
        let coord = coordinator(&bus);

        let (a, b) = tokio::join!(
            coord.authenticate("u1", "user"),
            coord.authenticate("u1", "user")
        );
        assert_ne!(a.unwrap(), b.unwrap());
        assert_eq!(coord.session_count(), 2);
    }

    #[tokio::test]
    async fn session_query_answers_valid_with_identity() {
        let bus = Arc::new(InMemoryBus::new());
        let mut responses = bus
            .subscribe(&[Topic::SessionInfo.wire().to_string()])
            .await
            .unwrap();
        let coord = coordinator(&bus);
        let session_id = coord.authenticate("u1", "admin").await.unwrap();

        coord
            .handle(
                Topic::SessionQuery,
                envelope_from(&json!({"session_id": session_id})),
            )
            .await;

        let msg = responses.recv().await.unwrap();
        let info: SessionInfo = Envelope::decode(&msg.payload).unwrap().payload().unwrap();
        assert_eq!(info.status, Status::Valid);
        assert_eq!(info.user_id.as_deref(), Some("u1"));
        assert_eq!(info.role.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn session_query_answers_invalid_for_unknown_id() {
        let bus = Arc::new(InMemoryBus::new());
        let mut responses = bus
            .subscribe(&[Topic::SessionInfo.wire().to_string()])
            .await
            .unwrap();
        let coord = coordinator(&bus);

        coord
            .handle(
                Topic::SessionQuery,
                envelope_from(&json!({"session_id": "nope"})),
            )
            .await;

        let msg = responses.recv().await.unwrap();
        let info: SessionInfo = Envelope::decode(&msg.payload).unwrap().payload().unwrap();
        assert_eq!(info.status, Status::Invalid);
        assert_eq!(info.user_id, None);
        assert_eq!(info.role, None);
    }

    #[tokio::test]
    async fn repeated_queries_each_get_an_answer() {
        let bus = Arc::new(InMemoryBus::new());
        let mut responses = bus
            .subscribe(&[Topic::SessionInfo.wire().to_string()])
            .await
            .unwrap();
        let coord = coordinator(&bus);

        for _ in 0..2 {
            coord
                .handle(
                    Topic::SessionQuery,
                    envelope_from(&json!({"session_id": "nope"})),
                )
                .await;
        }
        assert!(responses.recv().await.is_some());
        assert!(responses.recv().await.is_some());
    }

    #[tokio::test]
    async fn app_ready_then_await_redirect_consumes_record() {
        let bus = Arc::new(InMemoryBus::new());
        let coord = coordinator(&bus);

        coord
            .handle(
                Topic::AppReady,
                envelope_from(&json!({
                    "app_name": "demo",
                    "session_id": "s1",
                    "redirect_url": "http://localhost:5001/"
                })),
            )
            .await;

        let url = coord.await_redirect("s1", Duration::from_secs(1)).await;
        assert_eq!(url.as_deref(), Some("http://localhost:5001/"));
        // Read-once: the record is gone.
        assert_eq!(coord.pending_redirects(), 0);
        assert_eq!(
            coord.await_redirect("s1", Duration::from_millis(50)).await,
            None
        );
    }

    #[tokio::test]
    async fn await_redirect_wakes_on_late_announcement() {
        let bus = Arc::new(InMemoryBus::new());
        let coord = Arc::new(coordinator(&bus));

        let waiter = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move { coord.await_redirect("s1", Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        coord
            .handle(
                Topic::AppReady,
                envelope_from(&json!({"session_id": "s1", "redirect_url": "http://a/"})),
            )
            .await;

        assert_eq!(waiter.await.unwrap().as_deref(), Some("http://a/"));
    }

    #[tokio::test]
    async fn second_announcement_overwrites_first() {
        let bus = Arc::new(InMemoryBus::new());
        let coord = coordinator(&bus);

        for url in ["http://first/", "http://second/"] {
            coord
                .handle(
                    Topic::AppReady,
                    envelope_from(&json!({"session_id": "s1", "redirect_url": url})),
                )
                .await;
        }

        let url = coord.await_redirect("s1", Duration::from_secs(1)).await;
        assert_eq!(url.as_deref(), Some("http://second/"));
    }

    #[tokio::test]
    async fn partial_app_ready_is_ignored() {
        let bus = Arc::new(InMemoryBus::new());
        let coord = coordinator(&bus);

        coord
            .handle(Topic::AppReady, envelope_from(&json!({"session_id": "s1"})))
            .await;
        coord
            .handle(
                Topic::AppReady,
                envelope_from(&json!({"redirect_url": "http://a/"})),
            )
            .await;

        assert_eq!(coord.pending_redirects(), 0);
    }
}
