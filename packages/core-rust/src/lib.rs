//! Partyline core — envelope codec, topic catalog, and payload schemas.

pub mod clock;
pub mod envelope;
pub mod messages;
pub mod topics;
pub mod value;

pub use clock::{ClockSource, SystemClock};
pub use envelope::{CodecError, Envelope};
pub use messages::Status;
pub use topics::Topic;
pub use value::StoredValue;
