//! Async session host for item stores.
//!
//! A [`Session`] runs one [`workers::StoreWorker`] that owns every
//! authoritative store and serializes their mutations, plus any number of
//! [`workers::ObserverReplica`]s that follow the encoded replication stream
//! and reconcile it into observer stores. Clients talk to both through
//! cloneable handles and observe changes through the topic [`EventBus`].
pub mod api;
pub mod config;
pub mod events;
pub mod oracle;
pub mod session;
pub mod workers;

pub use api::{ObserverHandle, Result, RuntimeError, SessionHandle};
pub use config::RuntimeConfig;
pub use events::{Event, EventBus, Origin, ReplicationEvent, Topic};
pub use oracle::DefinitionCache;
pub use session::{Session, SessionBuilder};
pub use workers::ReplicaStatus;
