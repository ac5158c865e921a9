//! Persistent [`StateEngine`] implementation backed by redb.
//!
//! One ordered table keyed by the `(owner_id, key)` composite, so each
//! owner's rows are contiguous and per-owner scans are bounded range walks.
//! Every mutation runs in its own write transaction: single-row upserts are
//! atomic, so concurrent writers resolve last-writer-wins with the
//! `value`/`updated_at` pair committed together.

use std::path::Path;

use anyhow::Context;
use partyline_core::StoredValue;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::storage::engine::StateEngine;
use crate::storage::entry::StateEntry;

/// Value columns: tagged value text and the last-write time in millis.
const STATE: TableDefinition<(&str, &str), (&str, u64)> = TableDefinition::new("state");

/// Durable state storage in a single redb file.
pub struct RedbEngine {
    db: Database,
}

impl RedbEngine {
    /// Opens (or creates) the database file and ensures the table exists,
    /// so a fresh database serves reads immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or opened.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db = Database::create(path.as_ref())
            .with_context(|| format!("opening state database at {}", path.as_ref().display()))?;
        let txn = db.begin_write()?;
        txn.open_table(STATE)?;
        txn.commit()?;
        Ok(Self { db })
    }

    /// Collects the keys stored for one owner by walking the contiguous
    /// key range that starts at `(owner_id, "")`.
    fn owner_keys(
        table: &impl ReadableTable<(&'static str, &'static str), (&'static str, u64)>,
        owner_id: &str,
    ) -> anyhow::Result<Vec<String>> {
        let mut keys = Vec::new();
        for row in table.range((owner_id, "")..)? {
            let (guard, _) = row?;
            let (owner, key) = guard.value();
            if owner != owner_id {
                break;
            }
            keys.push(key.to_string());
        }
        Ok(keys)
    }
}

impl StateEngine for RedbEngine {
    fn get(&self, owner_id: &str, key: &str) -> anyhow::Result<Option<StateEntry>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(STATE)?;
        Ok(table.get((owner_id, key))?.map(|guard| {
            let (raw, updated_at) = guard.value();
            StateEntry {
                value: StoredValue::from_storage(raw),
                updated_at,
            }
        }))
    }

    fn set(
        &self,
        owner_id: &str,
        key: &str,
        value: StoredValue,
        now_millis: u64,
    ) -> anyhow::Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(STATE)?;
            table.insert((owner_id, key), (value.to_storage().as_str(), now_millis))?;
        }
        txn.commit()?;
        Ok(())
    }

    fn delete(&self, owner_id: &str, key: &str) -> anyhow::Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(STATE)?;
            table.remove((owner_id, key))?;
        }
        txn.commit()?;
        Ok(())
    }

    fn clear(&self, owner_id: &str) -> anyhow::Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(STATE)?;
            let doomed = Self::owner_keys(&table, owner_id)?;
            for key in doomed {
                table.remove((owner_id, key.as_str()))?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn list_keys(&self, owner_id: &str) -> anyhow::Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(STATE)?;
        Self::owner_keys(&table, owner_id)
    }

    fn get_all(&self, owner_id: &str) -> anyhow::Result<Vec<(String, StoredValue)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(STATE)?;
        let mut pairs = Vec::new();
        for row in table.range((owner_id, "")..)? {
            let (key_guard, value_guard) = row?;
            let (owner, key) = key_guard.value();
            if owner != owner_id {
                break;
            }
            let (raw, _) = value_guard.value();
            pairs.push((key.to_string(), StoredValue::from_storage(raw)));
        }
        Ok(pairs)
    }

    fn len(&self) -> anyhow::Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(STATE)?;
        Ok(usize::try_from(table.len()?)?)
    }
}
