//! Store facades.
//!
//! The network role of a store is fixed when it is built: an
//! [`AuthoritativeStore`] owns the mutating gameplay operations and produces
//! replication deltas, an [`ObserverStore`] applies those deltas and carries
//! the advisory locks for requests still in flight. Both answer the same
//! read-only [`StoreQuery`] interface.
mod authority;
mod locks;
mod observer;
mod shared;

pub use authority::{Attachment, AuthoritativeStore, RemoveAmount};
pub use locks::LockSet;
pub use observer::{ApplyReport, ObserverStore};
pub use shared::{StoreCore, StoreQuery};
