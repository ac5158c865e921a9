//! Typed payload schemas for the partyline protocol.
//!
//! Each submodule corresponds to a domain of messages. Field names are the
//! snake_case wire names; payloads serialize to JSON objects that the
//! [`Envelope`](crate::envelope::Envelope) codec stamps with a timestamp.

pub mod session;
pub mod state;

pub use session::{AppReady, AuthSuccess, SessionInfo, SessionQuery};
pub use state::{
    StateAllGet, StateAllValue, StateClear, StateDelete, StateGet, StateKeysList, StateKeysQuery,
    StateSet, StateValue,
};

use serde::{Deserialize, Serialize};

/// Outcome marker carried by response payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The request matched existing state.
    Valid,
    /// The session (or other identity) is unknown.
    Invalid,
    /// The requested key does not exist. A normal response, not an error.
    NotFound,
}
