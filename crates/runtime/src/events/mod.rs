//! Topic-based event bus for session events.
//!
//! Store events from the authority and every observer replica, plus the
//! encoded replication stream, are published to topics so consumers can
//! subscribe only to what they need.

mod bus;
mod types;

pub use bus::{Event, EventBus, Topic};
pub use types::{Origin, ReplicationEvent};
