//! Item ownership graph, replicated collections, and store facades.
//!
//! `item-core` defines the canonical item model (identity, spec, instance),
//! the id-indexed [`state::ItemCollection`] that owns every instance of one
//! store, and the graph operations that keep owner/attachment links and slot
//! assignments consistent. Mutation flows through the two store capabilities:
//! [`store::AuthoritativeStore`] applies gameplay requests and emits
//! [`state::ReplicationDelta`]s, while [`store::ObserverStore`] reconciles
//! those deltas in whatever order they arrive.
pub mod config;
pub mod engine;
pub mod env;
pub mod error;
pub mod events;
pub mod state;
pub mod store;

pub use config::StoreConfig;
pub use engine::{
    FragmentEvent, FragmentHook, FragmentRegistry, GraphViolation, PendingAttachments,
};
pub use env::{
    DefinitionOracle, Fragment, FragmentKind, ItemDefinition, SocketSlot, StackMethod,
    StaticDefinitions,
};
pub use error::{ErrorSeverity, ItemError, SpecError, StoreError};
pub use events::{EventListeners, ItemChange, ListenerId, LockTarget, StoreEvent};
pub use state::{
    DefinitionId, GraphState, InstanceData, InstanceKind, ItemCollection, ItemFields, ItemId,
    ItemIdGenerator, ItemInstance, ItemRecord, ItemSpec, ItemTag, ReplicationDelta,
    ReplicationRecord, SlotKey, SlotPhase, SlotTag, StoreId, StructureDigest,
};
#[cfg(feature = "serde")]
pub use state::CodecError;
pub use store::{
    ApplyReport, Attachment, AuthoritativeStore, LockSet, ObserverStore, RemoveAmount, StoreCore,
    StoreQuery,
};
