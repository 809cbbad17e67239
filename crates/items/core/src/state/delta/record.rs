use std::sync::Arc;

use super::bitmask::ItemFields;
use crate::env::ItemDefinition;
use crate::state::collection::ItemCollection;
use crate::state::instance::ItemInstance;
use crate::state::spec::InstanceData;
use crate::state::types::{DefinitionId, ItemId, ItemTag, SlotTag, StoreId};

/// Complete snapshot of one item's replicated fields.
///
/// Resolved definitions, aggregated tags and slot notification phases are
/// local derivations and never travel.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemRecord {
    pub id: ItemId,
    pub definition: DefinitionId,
    pub owner: Option<ItemId>,
    pub old_owner: Option<ItemId>,
    pub attached_items: Vec<ItemId>,
    pub slot: Option<SlotTag>,
    pub old_slot: Option<SlotTag>,
    pub attached_to_slot: Option<SlotTag>,
    pub old_attached_to_slot: Option<SlotTag>,
    pub level: u8,
    pub stacks: u16,
    pub dynamic_tags: Vec<ItemTag>,
    pub instances: Vec<InstanceData>,
    pub version: u32,
}

impl ItemRecord {
    pub fn capture(item: &ItemInstance) -> Self {
        Self {
            id: item.id,
            definition: item.definition_id,
            owner: item.owner,
            old_owner: item.old_owner,
            attached_items: item.attached_items.clone(),
            slot: item.slot.clone(),
            old_slot: item.old_slot.clone(),
            attached_to_slot: item.attached_to_slot.clone(),
            old_attached_to_slot: item.old_attached_to_slot.clone(),
            level: item.level,
            stacks: item.stacks,
            dynamic_tags: item.dynamic_tags.iter().cloned().collect(),
            instances: item.instances.values().cloned().collect(),
            version: item.version,
        }
    }

    /// Fields of `local` that this record would overwrite with a different value.
    pub fn changed_fields(&self, local: &ItemInstance) -> ItemFields {
        let mut fields = ItemFields::empty();
        if self.definition != local.definition_id {
            fields |= ItemFields::DEFINITION;
        }
        if self.owner != local.owner {
            fields |= ItemFields::OWNER;
        }
        if self.attached_to_slot != local.attached_to_slot {
            fields |= ItemFields::ATTACH_SLOT;
        }
        if self.attached_items != local.attached_items {
            fields |= ItemFields::ATTACHED_ITEMS;
        }
        if self.slot != local.slot {
            fields |= ItemFields::SLOT;
        }
        if self.level != local.level {
            fields |= ItemFields::LEVEL;
        }
        if self.stacks != local.stacks {
            fields |= ItemFields::STACKS;
        }
        if !self.dynamic_tags.iter().eq(local.dynamic_tags.iter()) {
            fields |= ItemFields::DYNAMIC_TAGS;
        }
        if !self.instances.iter().eq(local.instances.values()) {
            fields |= ItemFields::INSTANCES;
        }
        fields
    }

    /// Builds a local instance. Forward edges are left for reconciliation.
    pub(crate) fn to_instance(&self, definition: Option<Arc<ItemDefinition>>) -> ItemInstance {
        let mut item = ItemInstance::empty(self.id, self.definition);
        self.write_fields(&mut item);
        item.set_definition(definition);
        item
    }

    /// Overwrites every replicated field except `attached_items`.
    pub(crate) fn write_fields(&self, item: &mut ItemInstance) {
        item.definition_id = self.definition;
        item.owner = self.owner;
        item.old_owner = self.old_owner;
        item.slot = self.slot.clone();
        item.old_slot = self.old_slot.clone();
        item.attached_to_slot = self.attached_to_slot.clone();
        item.old_attached_to_slot = self.old_attached_to_slot.clone();
        item.level = self.level;
        item.stacks = self.stacks;
        item.dynamic_tags = self.dynamic_tags.iter().cloned().collect();
        item.instances = self
            .instances
            .iter()
            .map(|data| (data.kind(), data.clone()))
            .collect();
        item.version = self.version;
    }
}

/// One entry of a replication delta.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReplicationRecord {
    Add(ItemRecord),
    Change(ItemRecord),
    Remove(ItemId),
}

impl ReplicationRecord {
    pub fn id(&self) -> ItemId {
        match self {
            Self::Add(record) | Self::Change(record) => record.id,
            Self::Remove(id) => *id,
        }
    }
}

/// Ordered batch of records produced by one authoritative drain.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReplicationDelta {
    pub store: StoreId,
    pub sequence: u64,
    pub records: Vec<ReplicationRecord>,
}

impl ReplicationDelta {
    /// Drains the collection's pending changes.
    ///
    /// Removals come first, in removal order, so a parent's children are
    /// always removed before the parent itself.
    pub fn drain(items: &mut ItemCollection, store: StoreId, sequence: u64) -> Self {
        let changes = items.take_changes();
        let mut records: Vec<_> = changes
            .removed
            .into_iter()
            .map(ReplicationRecord::Remove)
            .collect();

        for (id, added) in changes.dirty {
            let Some(item) = items.get_item(id) else {
                continue;
            };
            let record = ItemRecord::capture(item);
            records.push(if added {
                ReplicationRecord::Add(record)
            } else {
                ReplicationRecord::Change(record)
            });
        }

        Self {
            store,
            sequence,
            records,
        }
    }

    /// Full-state delta for an observer joining late.
    pub fn snapshot(items: &ItemCollection, store: StoreId, sequence: u64) -> Self {
        Self {
            store,
            sequence,
            records: items
                .iter()
                .map(|item| ReplicationRecord::Add(ItemRecord::capture(item)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Wire codec failures.
#[cfg(feature = "serde")]
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode replication delta: {0}")]
    Encode(String),

    #[error("failed to decode replication delta: {0}")]
    Decode(String),
}

#[cfg(feature = "serde")]
impl crate::error::ItemError for CodecError {
    fn severity(&self) -> crate::error::ErrorSeverity {
        crate::error::ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Encode(_) => "CODEC_ENCODE",
            Self::Decode(_) => "CODEC_DECODE",
        }
    }
}

#[cfg(feature = "serde")]
impl ReplicationDelta {
    /// Encodes with bincode; the byte layout is deterministic for equal deltas.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
