//! In-memory [`StateEngine`] implementation backed by [`DashMap`].
//!
//! Provides concurrent read/write access without external locking. Suitable
//! for tests and deployments that accept losing state on restart.

use dashmap::DashMap;
use partyline_core::StoredValue;

use crate::storage::engine::StateEngine;
use crate::storage::entry::StateEntry;

/// In-memory state storage keyed by `(owner_id, key)`.
///
/// `DashMap` shards writes internally, so each insert/remove is atomic:
/// concurrent sets for one key resolve last-writer-wins with the whole
/// entry replaced at once.
pub struct MemoryEngine {
    entries: DashMap<(String, String), StateEntry>,
}

impl MemoryEngine {
    /// Creates a new, empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateEngine for MemoryEngine {
    fn get(&self, owner_id: &str, key: &str) -> anyhow::Result<Option<StateEntry>> {
        Ok(self
            .entries
            .get(&(owner_id.to_string(), key.to_string()))
            .map(|entry| entry.clone()))
    }

    fn set(
        &self,
        owner_id: &str,
        key: &str,
        value: StoredValue,
        now_millis: u64,
    ) -> anyhow::Result<()> {
        self.entries.insert(
            (owner_id.to_string(), key.to_string()),
            StateEntry {
                value,
                updated_at: now_millis,
            },
        );
        Ok(())
    }

    fn delete(&self, owner_id: &str, key: &str) -> anyhow::Result<()> {
        self.entries
            .remove(&(owner_id.to_string(), key.to_string()));
        Ok(())
    }

    fn clear(&self, owner_id: &str) -> anyhow::Result<()> {
        self.entries.retain(|(owner, _), _| owner != owner_id);
        Ok(())
    }

    fn list_keys(&self, owner_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == owner_id)
            .map(|entry| entry.key().1.clone())
            .collect())
    }

    fn get_all(&self, owner_id: &str) -> anyhow::Result<Vec<(String, StoredValue)>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == owner_id)
            .map(|entry| (entry.key().1.clone(), entry.value().value.clone()))
            .collect())
    }

    fn len(&self) -> anyhow::Result<usize> {
        Ok(self.entries.len())
    }
}
