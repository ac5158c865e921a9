//! Configuration types for the units and their backing store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::storage::engines::MemoryEngine;
#[cfg(feature = "redb")]
use crate::storage::engines::RedbEngine;
use crate::storage::StateEngine;

/// Timing knobs for the caller-side patterns.
#[derive(Debug, Clone)]
pub struct UnitConfig {
    /// Deadline for a correlated call.
    pub request_timeout: Duration,
    /// Sleep interval of the degraded poller. Bounds both its added latency
    /// and its CPU cost.
    pub poll_interval: Duration,
    /// Overall deadline for the two-stage view fetch.
    pub view_deadline: Duration,
    /// Deadline for a front end waiting on an app-ready redirect.
    pub redirect_deadline: Duration,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            view_deadline: Duration::from_secs(5),
            redirect_deadline: Duration::from_secs(30),
        }
    }
}

/// Which backing store the state unit runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Volatile in-memory storage; state ends with the process.
    Memory,
    /// Durable single-file storage.
    Redb,
}

/// Storage configuration for the state unit.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Engine selection.
    pub engine: EngineKind,
    /// Database file, used by the durable engine only.
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Redb,
            db_path: PathBuf::from("partyline_state.redb"),
        }
    }
}

impl StorageConfig {
    /// Builds the configured engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable engine cannot open its database, or
    /// if it was requested without the `redb` feature compiled in.
    pub fn build_engine(&self) -> anyhow::Result<Arc<dyn StateEngine>> {
        match self.engine {
            EngineKind::Memory => Ok(Arc::new(MemoryEngine::new())),
            #[cfg(feature = "redb")]
            EngineKind::Redb => Ok(Arc::new(RedbEngine::open(&self.db_path)?)),
            #[cfg(not(feature = "redb"))]
            EngineKind::Redb => anyhow::bail!("durable engine requested but redb is not compiled in"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_config_defaults() {
        let config = UnitConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.view_deadline, Duration::from_secs(5));
        assert_eq!(config.redirect_deadline, Duration::from_secs(30));
    }

    #[test]
    fn storage_config_defaults_to_durable_engine() {
        let config = StorageConfig::default();
        assert_eq!(config.engine, EngineKind::Redb);
        assert_eq!(config.db_path, PathBuf::from("partyline_state.redb"));
    }

    #[test]
    fn memory_engine_builds_without_a_file() {
        let config = StorageConfig {
            engine: EngineKind::Memory,
            db_path: PathBuf::new(),
        };
        let engine = config.build_engine().unwrap();
        assert!(engine.is_empty().unwrap());
    }

    #[cfg(feature = "redb")]
    #[test]
    fn redb_engine_builds_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            engine: EngineKind::Redb,
            db_path: dir.path().join("state.redb"),
        };
        let engine = config.build_engine().unwrap();
        assert!(engine.is_empty().unwrap());
    }
}
