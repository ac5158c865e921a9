//! The state unit: answers KV requests received over the bus.
//!
//! Every request envelope produces exactly one response envelope on the
//! matching response topic, with the request's `user_id` (and `key` where
//! applicable) echoed, never regenerated, so callers can correlate by
//! content even without an explicit id. A `get` on an absent key answers
//! `status=not_found` with a null value; that is a response, not an error.
//! Malformed payloads are dropped and logged.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use partyline_core::messages::{
    StateAllGet, StateAllValue, StateClear, StateDelete, StateGet, StateKeysList, StateKeysQuery,
    StateSet, StateValue, Status,
};
use partyline_core::topics::state_request_topics;
use partyline_core::{ClockSource, Envelope, StoredValue, Topic};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::bus::BusTransport;
use crate::storage::engine::StateEngine;
use crate::unit::{publish_reply, UnitHandler};

/// Bus-facing front of the KV state engine.
///
/// Safe under concurrent requests from multiple callers: consistency is the
/// engine's job, and handlers add no shared mutable state of their own.
pub struct StateService {
    bus: Arc<dyn BusTransport>,
    engine: Arc<dyn StateEngine>,
    clock: Arc<dyn ClockSource>,
}

impl StateService {
    /// Creates the service on top of a backing engine.
    #[must_use]
    pub fn new(
        bus: Arc<dyn BusTransport>,
        engine: Arc<dyn StateEngine>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self { bus, engine, clock }
    }

    /// The backing engine, for wiring and tests.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn StateEngine> {
        &self.engine
    }

    async fn on_get(&self, request: &Envelope) {
        let Some(req) = decode::<StateGet>(request, "state get") else {
            return;
        };
        let entry = match self.engine.get(&req.user_id, &req.key) {
            Ok(entry) => entry,
            Err(err) => {
                error!(%err, user_id = %req.user_id, key = %req.key, "state read failed");
                return;
            }
        };
        let response = match entry {
            Some(entry) => StateValue {
                user_id: req.user_id,
                key: req.key,
                value: entry.value.to_wire(),
                status: Status::Valid,
            },
            None => StateValue {
                user_id: req.user_id,
                key: req.key,
                value: Value::Null,
                status: Status::NotFound,
            },
        };
        info!(user_id = %response.user_id, key = %response.key, status = ?response.status, "answered state get");
        self.reply(Topic::StateValue, &response, request).await;
    }

    async fn on_set(&self, request: &Envelope) {
        let Some(req) = decode::<StateSet>(request, "state set") else {
            return;
        };
        let stored = StoredValue::from_wire(&req.value);
        if let Err(err) = self.engine.set(
            &req.user_id,
            &req.key,
            stored,
            self.clock.now_millis(),
        ) {
            error!(%err, user_id = %req.user_id, key = %req.key, "state write failed");
            return;
        }
        info!(user_id = %req.user_id, key = %req.key, "stored value");
        let ack = StateValue {
            user_id: req.user_id,
            key: req.key,
            value: req.value,
            status: Status::Valid,
        };
        self.reply(Topic::StateValue, &ack, request).await;
    }

    async fn on_delete(&self, request: &Envelope) {
        let Some(req) = decode::<StateDelete>(request, "state delete") else {
            return;
        };
        if let Err(err) = self.engine.delete(&req.user_id, &req.key) {
            error!(%err, user_id = %req.user_id, key = %req.key, "state delete failed");
            return;
        }
        info!(user_id = %req.user_id, key = %req.key, "deleted key");
        let ack = StateValue {
            user_id: req.user_id,
            key: req.key,
            value: Value::Null,
            status: Status::Valid,
        };
        self.reply(Topic::StateValue, &ack, request).await;
    }

    async fn on_clear(&self, request: &Envelope) {
        let Some(req) = decode::<StateClear>(request, "state clear") else {
            return;
        };
        if let Err(err) = self.engine.clear(&req.user_id) {
            error!(%err, user_id = %req.user_id, "state clear failed");
            return;
        }
        info!(user_id = %req.user_id, "cleared all keys");
        // Acknowledged as an empty snapshot of the owner's data.
        let ack = StateAllValue {
            user_id: req.user_id,
            data: BTreeMap::new(),
        };
        self.reply(Topic::StateAllValue, &ack, request).await;
    }

    async fn on_keys_query(&self, request: &Envelope) {
        let Some(req) = decode::<StateKeysQuery>(request, "keys query") else {
            return;
        };
        let keys = match self.engine.list_keys(&req.user_id) {
            Ok(keys) => keys,
            Err(err) => {
                error!(%err, user_id = %req.user_id, "key listing failed");
                return;
            }
        };
        info!(user_id = %req.user_id, count = keys.len(), "published key list");
        let response = StateKeysList {
            user_id: req.user_id,
            keys,
        };
        self.reply(Topic::StateKeysList, &response, request).await;
    }

    async fn on_all_get(&self, request: &Envelope) {
        let Some(req) = decode::<StateAllGet>(request, "all get") else {
            return;
        };
        let pairs = match self.engine.get_all(&req.user_id) {
            Ok(pairs) => pairs,
            Err(err) => {
                error!(%err, user_id = %req.user_id, "state read failed");
                return;
            }
        };
        let data: BTreeMap<String, Value> = pairs
            .into_iter()
            .map(|(key, value)| (key, value.to_wire()))
            .collect();
        info!(user_id = %req.user_id, count = data.len(), "published full snapshot");
        let response = StateAllValue {
            user_id: req.user_id,
            data,
        };
        self.reply(Topic::StateAllValue, &response, request).await;
    }

    async fn reply<T: serde::Serialize>(&self, topic: Topic, payload: &T, request: &Envelope) {
        publish_reply(
            self.bus.as_ref(),
            self.clock.as_ref(),
            topic,
            payload,
            request,
        )
        .await;
    }
}

/// Projects a request envelope onto its typed payload, logging and dropping
/// on mismatch.
fn decode<T: serde::de::DeserializeOwned>(request: &Envelope, what: &str) -> Option<T> {
    match request.payload() {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(%err, "dropping malformed {what}");
            None
        }
    }
}

#[async_trait]
impl UnitHandler for StateService {
    fn subscriptions(&self) -> Vec<String> {
        state_request_topics()
    }

    async fn handle(&self, topic: Topic, envelope: Envelope) {
        match topic {
            Topic::StateGet => self.on_get(&envelope).await,
            Topic::StateSet => self.on_set(&envelope).await,
            Topic::StateDelete => self.on_delete(&envelope).await,
            Topic::StateClear => self.on_clear(&envelope).await,
            Topic::StateKeysQuery => self.on_keys_query(&envelope).await,
            Topic::StateAllGet => self.on_all_get(&envelope).await,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use partyline_core::SystemClock;
    use serde_json::json;

    use super::*;
    use crate::bus::{BusSubscription, InMemoryBus};
    use crate::storage::engines::MemoryEngine;

    struct Fixture {
        bus: Arc<InMemoryBus>,
        service: StateService,
    }

    async fn fixture() -> Fixture {
        let bus = Arc::new(InMemoryBus::new());
        let service = StateService::new(
            Arc::clone(&bus) as Arc<dyn BusTransport>,
            Arc::new(MemoryEngine::new()),
            Arc::new(SystemClock),
        );
        Fixture { bus, service }
    }

    impl Fixture {
        async fn responses(&self, topic: Topic) -> BusSubscription {
            self.bus
                .subscribe(&[topic.wire().to_string()])
                .await
                .unwrap()
        }

        async fn request(&self, topic: Topic, body: serde_json::Value) {
            let envelope = Envelope::decode(&serde_json::to_vec(&body).unwrap()).unwrap();
            self.service.handle(topic, envelope).await;
        }
    }

    async fn next_payload<T: serde::de::DeserializeOwned>(sub: &mut BusSubscription) -> T {
        let msg = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("expected a response")
            .unwrap();
        Envelope::decode(&msg.payload).unwrap().payload().unwrap()
    }

    #[tokio::test]
    async fn set_then_get_roundtrips_scalar() {
        let fx = fixture().await;
        let mut values = fx.responses(Topic::StateValue).await;

        fx.request(
            Topic::StateSet,
            json!({"user_id": "u1", "key": "theme", "value": "dark"}),
        )
        .await;
        let ack: StateValue = next_payload(&mut values).await;
        assert_eq!(ack.status, Status::Valid);
        assert_eq!(ack.value, json!("dark"));

        fx.request(Topic::StateGet, json!({"user_id": "u1", "key": "theme"}))
            .await;
        let got: StateValue = next_payload(&mut values).await;
        assert_eq!(got.status, Status::Valid);
        assert_eq!(got.user_id, "u1");
        assert_eq!(got.key, "theme");
        assert_eq!(got.value, json!("dark"));
    }

    #[tokio::test]
    async fn set_then_get_roundtrips_structured() {
        let fx = fixture().await;
        let mut values = fx.responses(Topic::StateValue).await;
        let prefs = json!({"theme": "dark", "cols": [1, 2, 3]});

        fx.request(
            Topic::StateSet,
            json!({"user_id": "u1", "key": "prefs", "value": prefs}),
        )
        .await;
        let _ack: StateValue = next_payload(&mut values).await;

        fx.request(Topic::StateGet, json!({"user_id": "u1", "key": "prefs"}))
            .await;
        let got: StateValue = next_payload(&mut values).await;
        assert_eq!(got.value, prefs);
    }

    #[tokio::test]
    async fn get_absent_key_answers_not_found() {
        let fx = fixture().await;
        let mut values = fx.responses(Topic::StateValue).await;

        fx.request(Topic::StateGet, json!({"user_id": "u1", "key": "missing"}))
            .await;
        let got: StateValue = next_payload(&mut values).await;
        assert_eq!(got.status, Status::NotFound);
        assert!(got.value.is_null());
        assert_eq!(got.key, "missing");
    }

    #[tokio::test]
    async fn delete_then_get_answers_not_found() {
        let fx = fixture().await;
        let mut values = fx.responses(Topic::StateValue).await;

        fx.request(
            Topic::StateSet,
            json!({"user_id": "u1", "key": "theme", "value": "dark"}),
        )
        .await;
        let _ack: StateValue = next_payload(&mut values).await;

        fx.request(Topic::StateDelete, json!({"user_id": "u1", "key": "theme"}))
            .await;
        let ack: StateValue = next_payload(&mut values).await;
        assert_eq!(ack.status, Status::Valid);

        fx.request(Topic::StateGet, json!({"user_id": "u1", "key": "theme"}))
            .await;
        let got: StateValue = next_payload(&mut values).await;
        assert_eq!(got.status, Status::NotFound);
    }

    #[tokio::test]
    async fn delete_absent_key_still_acknowledges() {
        let fx = fixture().await;
        let mut values = fx.responses(Topic::StateValue).await;

        fx.request(Topic::StateDelete, json!({"user_id": "u1", "key": "ghost"}))
            .await;
        let ack: StateValue = next_payload(&mut values).await;
        assert_eq!(ack.status, Status::Valid);
        assert_eq!(ack.key, "ghost");
    }

    #[tokio::test]
    async fn keys_query_lists_each_key_once() {
        let fx = fixture().await;
        let mut values = fx.responses(Topic::StateValue).await;
        let mut lists = fx.responses(Topic::StateKeysList).await;

        for key in ["a", "b", "c"] {
            fx.request(
                Topic::StateSet,
                json!({"user_id": "u1", "key": key, "value": key}),
            )
            .await;
            let _ack: StateValue = next_payload(&mut values).await;
        }

        fx.request(Topic::StateKeysQuery, json!({"user_id": "u1"}))
            .await;
        let list: StateKeysList = next_payload(&mut lists).await;
        let mut keys = list.keys;
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn set_all_get_clear_scenario() {
        let fx = fixture().await;
        let mut values = fx.responses(Topic::StateValue).await;
        let mut snapshots = fx.responses(Topic::StateAllValue).await;

        fx.request(
            Topic::StateSet,
            json!({"user_id": "u1", "key": "theme", "value": "dark"}),
        )
        .await;
        let _ack: StateValue = next_payload(&mut values).await;

        fx.request(Topic::StateAllGet, json!({"user_id": "u1"})).await;
        let snapshot: StateAllValue = next_payload(&mut snapshots).await;
        assert_eq!(snapshot.data.len(), 1);
        assert_eq!(snapshot.data["theme"], json!("dark"));

        fx.request(Topic::StateClear, json!({"user_id": "u1"})).await;
        let ack: StateAllValue = next_payload(&mut snapshots).await;
        assert!(ack.data.is_empty());

        fx.request(Topic::StateAllGet, json!({"user_id": "u1"})).await;
        let snapshot: StateAllValue = next_payload(&mut snapshots).await;
        assert!(snapshot.data.is_empty());
    }

    #[tokio::test]
    async fn clear_leaves_other_owners_untouched() {
        let fx = fixture().await;
        let mut values = fx.responses(Topic::StateValue).await;
        let mut snapshots = fx.responses(Topic::StateAllValue).await;

        for owner in ["u1", "u2"] {
            fx.request(
                Topic::StateSet,
                json!({"user_id": owner, "key": "theme", "value": "dark"}),
            )
            .await;
            let _ack: StateValue = next_payload(&mut values).await;
        }

        fx.request(Topic::StateClear, json!({"user_id": "u1"})).await;
        let _ack: StateAllValue = next_payload(&mut snapshots).await;

        fx.request(Topic::StateAllGet, json!({"user_id": "u2"})).await;
        let snapshot: StateAllValue = next_payload(&mut snapshots).await;
        assert_eq!(snapshot.data.len(), 1);
    }

    #[tokio::test]
    async fn malformed_request_produces_no_response() {
        let fx = fixture().await;
        let mut values = fx.responses(Topic::StateValue).await;

        // Missing the required `key` field.
        fx.request(Topic::StateGet, json!({"user_id": "u1"})).await;

        let outcome =
            tokio::time::timeout(Duration::from_millis(100), values.recv()).await;
        assert!(outcome.is_err(), "no response expected for a malformed request");
    }

    #[tokio::test]
    async fn response_echoes_correlation_id_when_present() {
        let fx = fixture().await;
        let mut values = fx.responses(Topic::StateValue).await;

        fx.request(
            Topic::StateGet,
            json!({"id": "abcd1234", "user_id": "u1", "key": "theme"}),
        )
        .await;

        let msg = tokio::time::timeout(Duration::from_secs(1), values.recv())
            .await
            .unwrap()
            .unwrap();
        let envelope = Envelope::decode(&msg.payload).unwrap();
        assert_eq!(envelope.get_str("id"), Some("abcd1234"));
    }
}
