//! Item data model and the per-store collection that owns it.
//!
//! - [`types`]: identifiers and tag newtypes
//! - [`spec`]: immutable creation templates
//! - [`instance`]: the mutable runtime record of one item
//! - [`collection`]: generational arena with id index and dirty tracking
//! - [`delta`]: replication records exchanged between authority and observers
mod collection;
mod delta;
mod digest;
mod instance;
mod spec;
mod types;

pub use collection::{ItemCollection, SlotKey};
#[cfg(feature = "serde")]
pub use delta::CodecError;
pub use delta::{ItemFields, ItemRecord, ReplicationDelta, ReplicationRecord};
pub use digest::StructureDigest;
pub use instance::{GraphState, ItemInstance, SlotPhase};
pub use spec::{InstanceData, InstanceKind, ItemSpec};
pub use types::{DefinitionId, ItemId, ItemIdGenerator, ItemTag, SlotTag, StoreId};
