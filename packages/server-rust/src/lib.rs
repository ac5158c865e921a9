//! Partyline server units: correlation client, session coordinator, KV state
//! engine, and the degraded bus-backed poller.

pub mod bus;
pub mod config;
pub mod correlate;
pub mod error;
pub mod poll;
pub mod session;
pub mod shutdown;
pub mod storage;
pub mod unit;

pub use bus::{BusMessage, BusSubscription, BusTransport, InMemoryBus};
pub use config::{EngineKind, StorageConfig, UnitConfig};
pub use correlate::CorrelationClient;
pub use error::RequestError;
pub use poll::{BusPoller, ViewData};
pub use session::{SessionCoordinator, SessionRecord};
pub use shutdown::{HealthState, ShutdownController};
pub use storage::{StateEngine, StateService};
pub use unit::{publish_reply, spawn_unit, UnitHandler};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
