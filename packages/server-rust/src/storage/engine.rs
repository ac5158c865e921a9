//! Backing-store trait for the state unit.

use partyline_core::StoredValue;

use super::entry::StateEntry;

/// Durable mapping from `(owner_id, key)` to a tagged value.
///
/// Used as `Arc<dyn StateEngine>` and shared across async boundaries; all
/// operations are synchronous. Implementations rely on their backing
/// store's native per-statement consistency: two concurrent `set` calls for
/// the same `(owner_id, key)` resolve last-writer-wins, with the
/// `value`/`updated_at` pair written together, never interleaved.
pub trait StateEngine: Send + Sync {
    /// Reads one entry. `Ok(None)` when absent: not-found is a normal
    /// answer, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backing store itself fails.
    fn get(&self, owner_id: &str, key: &str) -> anyhow::Result<Option<StateEntry>>;

    /// Inserts or replaces one entry, refreshing its `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backing store itself fails.
    fn set(
        &self,
        owner_id: &str,
        key: &str,
        value: StoredValue,
        now_millis: u64,
    ) -> anyhow::Result<()>;

    /// Removes one entry. A no-op if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backing store itself fails.
    fn delete(&self, owner_id: &str, key: &str) -> anyhow::Result<()>;

    /// Removes every entry for an owner. A no-op if none exist.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backing store itself fails.
    fn clear(&self, owner_id: &str) -> anyhow::Result<()>;

    /// Keys stored for an owner, in storage order, each exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backing store itself fails.
    fn list_keys(&self, owner_id: &str) -> anyhow::Result<Vec<String>>;

    /// Every `(key, value)` pair stored for an owner.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backing store itself fails.
    fn get_all(&self, owner_id: &str) -> anyhow::Result<Vec<(String, StoredValue)>>;

    /// Total number of entries across all owners.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backing store itself fails.
    fn len(&self) -> anyhow::Result<usize>;

    /// `true` when no entries exist.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backing store itself fails.
    fn is_empty(&self) -> anyhow::Result<bool> {
        Ok(self.len()? == 0)
    }
}
