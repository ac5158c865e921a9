//! Topic catalog: the fixed set of logical channels and their wire strings.
//!
//! Every unit agrees on these names; they are the single source of truth for
//! the wire strings. Per-unit reply channels are derived from the unit name
//! via [`response_topic`].

/// Namespace prefix shared by every partyline topic.
pub const TOPIC_PREFIX: &str = "partyline";

/// A logical channel on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Published once per successful login.
    AuthSuccess,
    /// A downstream unit announces a prepared destination for a session.
    AppReady,
    /// Request: resolve a session id to its identity.
    SessionQuery,
    /// Response to [`Topic::SessionQuery`].
    SessionInfo,
    /// Request: read one value.
    StateGet,
    /// Request: upsert one value.
    StateSet,
    /// Response carrying a single value (also acknowledges mutations).
    StateValue,
    /// Request: list keys for an owner.
    StateKeysQuery,
    /// Response to [`Topic::StateKeysQuery`].
    StateKeysList,
    /// Request: read every entry for an owner.
    StateAllGet,
    /// Response to [`Topic::StateAllGet`].
    StateAllValue,
    /// Request: remove one key.
    StateDelete,
    /// Request: remove every entry for an owner.
    StateClear,
}

impl Topic {
    /// Every topic in the catalog, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::AuthSuccess,
        Self::AppReady,
        Self::SessionQuery,
        Self::SessionInfo,
        Self::StateGet,
        Self::StateSet,
        Self::StateValue,
        Self::StateKeysQuery,
        Self::StateKeysList,
        Self::StateAllGet,
        Self::StateAllValue,
        Self::StateDelete,
        Self::StateClear,
    ];

    /// The wire string for this topic.
    #[must_use]
    pub const fn wire(self) -> &'static str {
        match self {
            Self::AuthSuccess => "partyline/auth/success",
            Self::AppReady => "partyline/app/ready",
            Self::SessionQuery => "partyline/session/query",
            Self::SessionInfo => "partyline/session/info",
            Self::StateGet => "partyline/state/get",
            Self::StateSet => "partyline/state/set",
            Self::StateValue => "partyline/state/value",
            Self::StateKeysQuery => "partyline/state/keys/query",
            Self::StateKeysList => "partyline/state/keys/list",
            Self::StateAllGet => "partyline/state/all/get",
            Self::StateAllValue => "partyline/state/all/value",
            Self::StateDelete => "partyline/state/delete",
            Self::StateClear => "partyline/state/clear",
        }
    }

    /// Maps a wire string back to its topic, or `None` for unknown strings
    /// (per-unit channels and foreign traffic).
    #[must_use]
    pub fn parse(wire: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.wire() == wire)
    }
}

/// Reply channel a unit listens on for correlated responses.
#[must_use]
pub fn response_topic(unit_name: &str) -> String {
    format!("{TOPIC_PREFIX}/{unit_name}/response")
}

/// Request channel for the method-style client API (`get`, `post`, ...).
#[must_use]
pub fn request_topic(unit_name: &str, method: &str) -> String {
    format!("{TOPIC_PREFIX}/{unit_name}/{method}")
}

/// The request topics the state unit serves.
#[must_use]
pub fn state_request_topics() -> Vec<String> {
    [
        Topic::StateGet,
        Topic::StateSet,
        Topic::StateKeysQuery,
        Topic::StateAllGet,
        Topic::StateDelete,
        Topic::StateClear,
    ]
    .into_iter()
    .map(|t| t.wire().to_string())
    .collect()
}

/// The topics the session coordinator serves.
#[must_use]
pub fn session_coordinator_topics() -> Vec<String> {
    [Topic::AppReady, Topic::SessionQuery]
        .into_iter()
        .map(|t| t.wire().to_string())
        .collect()
}
