use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::spec::{InstanceData, InstanceKind, ItemSpec};
use super::types::{DefinitionId, ItemId, ItemTag, SlotTag};
use crate::env::ItemDefinition;

/// Position of an item in the owner/slot state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GraphState {
    /// No owner, no slot.
    Standalone,
    /// No owner, occupies a standalone slot.
    Slotted,
    /// Occupies a socket on another item.
    Attached,
}

/// Which slot notification was delivered last for an item.
///
/// Keeps "added to slot" and "removed from slot" strictly alternating no
/// matter how many code paths (own slot, owner cascade, replication) reach
/// the same item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SlotPhase {
    #[default]
    Idle,
    Added,
    Removed,
}

/// Mutable runtime record of one item.
///
/// Links to other items are ids resolved through the owning
/// [`super::ItemCollection`]; an instance never holds another instance.
#[derive(Clone, Debug)]
pub struct ItemInstance {
    pub(crate) id: ItemId,
    pub(crate) definition_id: DefinitionId,
    pub(crate) definition: Option<Arc<ItemDefinition>>,
    pub(crate) owner: Option<ItemId>,
    pub(crate) old_owner: Option<ItemId>,
    pub(crate) attached_items: Vec<ItemId>,
    pub(crate) slot: Option<SlotTag>,
    pub(crate) old_slot: Option<SlotTag>,
    pub(crate) attached_to_slot: Option<SlotTag>,
    pub(crate) old_attached_to_slot: Option<SlotTag>,
    pub(crate) level: u8,
    pub(crate) stacks: u16,
    pub(crate) aggregated_tags: BTreeSet<ItemTag>,
    pub(crate) dynamic_tags: BTreeSet<ItemTag>,
    pub(crate) instances: BTreeMap<InstanceKind, InstanceData>,
    pub(crate) version: u32,
    pub(crate) slot_phase: SlotPhase,
}

impl ItemInstance {
    /// Builds a fresh, unlinked instance from a spec.
    ///
    /// Definition fragments seed instance payloads first; payloads carried
    /// by the spec then replace seeds of the same kind.
    pub fn from_spec(id: ItemId, spec: &ItemSpec, definition: Arc<ItemDefinition>) -> Self {
        let mut instances = BTreeMap::new();
        for data in definition.fragments.iter().filter_map(|f| f.initial_instance()) {
            instances.insert(data.kind(), data);
        }
        for data in spec.fragment_instances() {
            instances.insert(data.kind(), data.clone());
        }

        let mut instance = Self::empty(id, spec.definition);
        instance.level = spec.level;
        instance.stacks = spec.amount;
        instance.instances = instances;
        instance.set_definition(Some(definition));
        instance
    }

    pub(crate) fn empty(id: ItemId, definition_id: DefinitionId) -> Self {
        Self {
            id,
            definition_id,
            definition: None,
            owner: None,
            old_owner: None,
            attached_items: Vec::new(),
            slot: None,
            old_slot: None,
            attached_to_slot: None,
            old_attached_to_slot: None,
            level: 1,
            stacks: 1,
            aggregated_tags: BTreeSet::new(),
            dynamic_tags: BTreeSet::new(),
            instances: BTreeMap::new(),
            version: 0,
            slot_phase: SlotPhase::Idle,
        }
    }

    /// Replaces the resolved definition and resets aggregated tags to it.
    pub(crate) fn set_definition(&mut self, definition: Option<Arc<ItemDefinition>>) {
        self.aggregated_tags = definition
            .as_deref()
            .map(|def| def.all_tags().cloned().collect())
            .unwrap_or_default();
        self.definition = definition;
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn definition_id(&self) -> DefinitionId {
        self.definition_id
    }

    /// Resolved definition, `None` while the definition is not loaded.
    pub fn definition(&self) -> Option<&Arc<ItemDefinition>> {
        self.definition.as_ref()
    }

    pub fn owner(&self) -> Option<ItemId> {
        self.owner
    }

    pub fn old_owner(&self) -> Option<ItemId> {
        self.old_owner
    }

    pub fn attached_items(&self) -> &[ItemId] {
        &self.attached_items
    }

    pub fn slot(&self) -> Option<&SlotTag> {
        self.slot.as_ref()
    }

    pub fn old_slot(&self) -> Option<&SlotTag> {
        self.old_slot.as_ref()
    }

    pub fn attached_to_slot(&self) -> Option<&SlotTag> {
        self.attached_to_slot.as_ref()
    }

    pub fn old_attached_to_slot(&self) -> Option<&SlotTag> {
        self.old_attached_to_slot.as_ref()
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn stacks(&self) -> u16 {
        self.stacks
    }

    /// Definition tags merged with the tags of everything attached below.
    pub fn aggregated_tags(&self) -> &BTreeSet<ItemTag> {
        &self.aggregated_tags
    }

    pub fn dynamic_tags(&self) -> &BTreeSet<ItemTag> {
        &self.dynamic_tags
    }

    pub fn has_tag(&self, tag: &ItemTag) -> bool {
        self.aggregated_tags.contains(tag) || self.dynamic_tags.contains(tag)
    }

    pub fn instance(&self, kind: InstanceKind) -> Option<&InstanceData> {
        self.instances.get(&kind)
    }

    pub fn instances(&self) -> impl Iterator<Item = &InstanceData> + '_ {
        self.instances.values()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn slot_phase(&self) -> SlotPhase {
        self.slot_phase
    }

    pub fn graph_state(&self) -> GraphState {
        match (self.owner, &self.slot) {
            (Some(_), _) => GraphState::Attached,
            (None, Some(_)) => GraphState::Slotted,
            (None, None) => GraphState::Standalone,
        }
    }

    /// Unique insert of a forward edge. Returns `false` when already present.
    pub(crate) fn link_child(&mut self, child: ItemId) -> bool {
        if self.attached_items.contains(&child) {
            return false;
        }
        self.attached_items.push(child);
        true
    }

    pub(crate) fn unlink_child(&mut self, child: ItemId) -> bool {
        let before = self.attached_items.len();
        self.attached_items.retain(|id| *id != child);
        before != self.attached_items.len()
    }
}
