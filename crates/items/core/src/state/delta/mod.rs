//! Replication records exchanged between an authoritative store and its observers.
//!
//! Every add/change record is a complete snapshot of one item's replicated
//! fields; [`ItemFields`] is only used on the receiving side to decide which
//! graph transitions a snapshot implies.
mod bitmask;
mod record;

pub use bitmask::ItemFields;
#[cfg(feature = "serde")]
pub use record::CodecError;
pub use record::{ItemRecord, ReplicationDelta, ReplicationRecord};
