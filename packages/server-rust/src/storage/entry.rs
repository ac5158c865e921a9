//! Record type stored by the state engine.

use partyline_core::StoredValue;

/// A stored value plus its last-write time.
///
/// Unique per `(owner_id, key)`; the pair of fields is always written
/// together (last-writer-wins, never a partial write).
#[derive(Debug, Clone, PartialEq)]
pub struct StateEntry {
    /// The tagged value.
    pub value: StoredValue,
    /// Milliseconds since epoch of the last write.
    pub updated_at: u64,
}
