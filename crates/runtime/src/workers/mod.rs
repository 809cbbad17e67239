//! Worker tasks that back the session orchestration.
//!
//! The store worker executes every authoritative mutation, while observer
//! replicas follow the replication stream and reconcile it locally.

mod observer;
mod store;

pub use observer::{ObserverReplica, ReplicaCommand, ReplicaStatus};
pub use store::{Command, SlotCommand, StoreWorker, TagCommand};
