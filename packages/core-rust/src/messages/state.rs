//! State (KV store) request and response payloads.
//!
//! Requests carry an `action` discriminator alongside the routing topic for
//! wire compatibility with the original protocol; receivers route by topic
//! and ignore the discriminator. Responses echo the `user_id` (and `key`
//! where applicable) from the request, never regenerate them, so callers can
//! correlate by content.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Status;

/// `action` discriminator values carried by state requests.
pub mod action {
    pub const GET: &str = "get";
    pub const SET: &str = "set";
    pub const LIST_KEYS: &str = "list_keys";
    pub const GET_ALL: &str = "get_all";
    pub const DELETE: &str = "delete";
    pub const CLEAR_ALL: &str = "clear_all";
}

/// Request on `state/get`: read one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateGet {
    pub user_id: String,
    pub key: String,
    #[serde(default)]
    pub action: String,
}

impl StateGet {
    #[must_use]
    pub fn new(user_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            key: key.into(),
            action: action::GET.to_string(),
        }
    }
}

/// Request on `state/set`: upsert one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSet {
    pub user_id: String,
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub action: String,
}

impl StateSet {
    #[must_use]
    pub fn new(user_id: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Self {
            user_id: user_id.into(),
            key: key.into(),
            value,
            action: action::SET.to_string(),
        }
    }
}

/// Request on `state/delete`: remove one key. A no-op if the key is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDelete {
    pub user_id: String,
    pub key: String,
    #[serde(default)]
    pub action: String,
}

impl StateDelete {
    #[must_use]
    pub fn new(user_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            key: key.into(),
            action: action::DELETE.to_string(),
        }
    }
}

/// Request on `state/clear`: remove every entry for an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateClear {
    pub user_id: String,
    #[serde(default)]
    pub action: String,
}

impl StateClear {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            action: action::CLEAR_ALL.to_string(),
        }
    }
}

/// Request on `state/keys/query`: list keys for an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateKeysQuery {
    pub user_id: String,
    #[serde(default)]
    pub action: String,
}

impl StateKeysQuery {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            action: action::LIST_KEYS.to_string(),
        }
    }
}

/// Request on `state/all/get`: read every entry for an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAllGet {
    pub user_id: String,
    #[serde(default)]
    pub action: String,
}

impl StateAllGet {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            action: action::GET_ALL.to_string(),
        }
    }
}

/// Response on `state/value`: a single value, or an acknowledgement for a
/// mutation. `value` is null when `status` is [`Status::NotFound`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateValue {
    pub user_id: String,
    pub key: String,
    #[serde(default)]
    pub value: Value,
    pub status: Status,
}

/// Response on `state/keys/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateKeysList {
    pub user_id: String,
    pub keys: Vec<String>,
}

/// Response on `state/all/value`: every entry for an owner.
///
/// `BTreeMap` keeps the serialized key order deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateAllValue {
    pub user_id: String,
    pub data: BTreeMap<String, Value>,
}
