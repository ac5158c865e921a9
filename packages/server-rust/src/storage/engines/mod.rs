//! [`StateEngine`](super::engine::StateEngine) implementations.

pub mod memory;
#[cfg(feature = "redb")]
pub mod redb;

pub use memory::MemoryEngine;
#[cfg(feature = "redb")]
pub use redb::RedbEngine;
