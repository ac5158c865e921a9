//! Storage layer for the state unit.
//!
//! Two layers: [`StateEngine`] is the swappable backing store (in-memory for
//! tests and ephemeral deployments, redb for durability), and
//! [`StateService`] is the bus-facing unit that drives it.

pub mod engine;
pub mod engines;
pub mod entry;
pub mod service;

pub use engine::StateEngine;
pub use engines::MemoryEngine;
#[cfg(feature = "redb")]
pub use engines::RedbEngine;
pub use entry::StateEntry;
pub use service::StateService;
