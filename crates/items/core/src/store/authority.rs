use std::sync::Arc;

use tracing::{debug, trace};

use super::shared::{StoreCore, StoreQuery, refuse};
use crate::config::StoreConfig;
use crate::engine::{FragmentEvent, FragmentRegistry};
use crate::env::{DefinitionOracle, ItemDefinition, StackMethod};
use crate::error::StoreError;
use crate::events::{EventListeners, ItemChange};
use crate::state::{
    DefinitionId, InstanceData, ItemCollection, ItemId, ItemIdGenerator, ItemInstance, ItemSpec,
    ItemTag, ReplicationDelta, SlotPhase, SlotTag, StoreId,
};

type Result<T> = std::result::Result<T, StoreError>;

/// Socket on an existing item that a new item should occupy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub owner: ItemId,
    pub socket: SlotTag,
}

impl Attachment {
    pub fn new(owner: ItemId, socket: impl Into<SlotTag>) -> Self {
        Self {
            owner,
            socket: socket.into(),
        }
    }
}

/// How much of an item a removal takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveAmount {
    /// Structural removal regardless of stacks.
    All,
    /// Decrement the stack count by this much.
    Stacks(u16),
}

/// Store role that owns gameplay mutation and produces replication deltas.
///
/// Every public operation runs to completion, then hands its queued events to
/// the listeners. Refused requests leave the store untouched.
pub struct AuthoritativeStore {
    core: StoreCore,
    ids: ItemIdGenerator,
    sequence: u64,
}

impl AuthoritativeStore {
    pub fn new(
        id: StoreId,
        definitions: Arc<dyn DefinitionOracle>,
        fragments: Arc<FragmentRegistry>,
        config: StoreConfig,
    ) -> Self {
        let ids = ItemIdGenerator::new(config.id_session);
        Self {
            core: StoreCore::new(id, ItemCollection::new(), definitions, fragments, config),
            ids,
            sequence: 0,
        }
    }

    pub fn listeners(&mut self) -> &mut EventListeners {
        &mut self.core.listeners
    }

    /// Sequence number of the last delta handed out.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Creates an item from `spec`, optionally plugged into a socket.
    ///
    /// Default socket occupants declared by the definition are created and
    /// attached recursively. For `ByType` definitions without an attachment
    /// the amount is merged into existing standalone stacks first; the
    /// returned id is the first item that received stacks.
    pub fn add_item(&mut self, spec: &ItemSpec, attach: Option<Attachment>) -> Result<ItemId> {
        let result = self.add_item_inner(spec, attach);
        self.core.flush_events();
        result
    }

    fn add_item_inner(&mut self, spec: &ItemSpec, attach: Option<Attachment>) -> Result<ItemId> {
        let store = self.core.id;
        let Some(definition) = self.core.definitions.definition(spec.definition) else {
            return refuse(
                store,
                StoreError::UnknownDefinition {
                    definition: spec.definition,
                },
            );
        };
        if spec.id.is_valid() && self.core.items.contains(spec.id) {
            return refuse(store, StoreError::DuplicateItem { id: spec.id });
        }

        let depth = match &attach {
            Some(target) => {
                self.check_socket(None, target.owner, &target.socket)?;
                let depth = self.core.reducer().ancestors(target.owner).len() + 2;
                let max = self.core.config.max_attachment_depth;
                if depth > max {
                    return refuse(
                        store,
                        StoreError::AttachmentTooDeep {
                            owner: target.owner,
                            max,
                        },
                    );
                }
                depth
            }
            None => 1,
        };

        let amount = spec.amount.max(1);
        let id = match (definition.stack_method, &attach) {
            (StackMethod::Unique, _) => {
                if let Some(existing) = self.first_of(definition.id) {
                    return refuse(
                        store,
                        StoreError::UniqueItemExists {
                            definition: definition.id,
                            existing,
                        },
                    );
                }
                self.create(spec, spec.id, amount, definition, depth, attach.as_ref())?
            }
            (StackMethod::ByType { max_stacks }, None) => {
                self.merge_stacks(spec, amount, max_stacks.max(1), definition)?
            }
            (StackMethod::ByType { max_stacks }, Some(_)) => {
                let stacks = amount.min(max_stacks.max(1));
                self.create(spec, spec.id, stacks, definition, depth, attach.as_ref())?
            }
            (StackMethod::CanNotStack, _) => {
                self.create(spec, spec.id, amount, definition, depth, attach.as_ref())?
            }
        };
        Ok(id)
    }

    fn first_of(&self, definition: DefinitionId) -> Option<ItemId> {
        self.items_by_definition(definition)
            .first()
            .map(|item| item.id())
    }

    fn merge_stacks(
        &mut self,
        spec: &ItemSpec,
        amount: u16,
        max: u16,
        definition: Arc<ItemDefinition>,
    ) -> Result<ItemId> {
        let open: Vec<ItemId> = self
            .core
            .items
            .items_where(|item| {
                item.definition_id() == definition.id
                    && item.owner().is_none()
                    && item.stacks() < max
            })
            .into_iter()
            .map(ItemInstance::id)
            .collect();

        let mut remaining = amount;
        let mut first = None;
        for id in open {
            if remaining == 0 {
                break;
            }
            let mut graph = self.core.reducer();
            let Some(item) = graph.items.get_item_mut(id) else {
                continue;
            };
            let taken = (max - item.stacks).min(remaining);
            item.stacks += taken;
            remaining -= taken;
            graph.changed(id);
            first.get_or_insert(id);
        }

        let mut requested = spec.id;
        while remaining > 0 {
            let stacks = remaining.min(max);
            let id = self.create(spec, requested, stacks, definition.clone(), 1, None)?;
            requested = ItemId::INVALID;
            remaining -= stacks;
            first.get_or_insert(id);
        }
        first.ok_or(StoreError::UnknownDefinition {
            definition: definition.id,
        })
    }

    /// Inserts one item, plugs it into `attach` and creates its default
    /// socket occupants.
    ///
    /// `Added` goes out last, once the item is linked to its owner and every
    /// default occupant is attached to it.
    fn create(
        &mut self,
        spec: &ItemSpec,
        requested: ItemId,
        stacks: u16,
        definition: Arc<ItemDefinition>,
        depth: usize,
        attach: Option<&Attachment>,
    ) -> Result<ItemId> {
        let id = if requested.is_valid() {
            requested
        } else {
            match self.ids.next_id() {
                Some(id) => id,
                None => {
                    let session = self.ids.session();
                    return refuse(self.core.id, StoreError::IdsExhausted { session });
                }
            }
        };
        self.ids.observe(id);

        let mut instance = ItemInstance::from_spec(id, spec, definition.clone());
        instance.stacks = stacks;
        if self.core.items.insert(instance).is_none() {
            return refuse(self.core.id, StoreError::DuplicateItem { id });
        }
        if let Some(target) = attach {
            let mut graph = self.core.reducer();
            graph.attach(id, target.owner, target.socket.clone());
            graph.changed(id);
            graph.changed(target.owner);
        }

        if depth < self.core.config.max_attachment_depth {
            for socket in definition.socket_slots() {
                let Some(occupant) = socket.default_occupant else {
                    continue;
                };
                let Some(occupant_def) = self.core.definitions.definition(occupant) else {
                    debug!(item = %id, definition = %occupant, "default occupant definition not loaded");
                    continue;
                };
                let slot = Attachment::new(id, socket.socket.clone());
                self.create(
                    &ItemSpec::new(occupant),
                    ItemId::INVALID,
                    1,
                    occupant_def,
                    depth + 1,
                    Some(&slot),
                )?;
            }
        }

        let mut graph = self.core.reducer();
        graph.notify(id, FragmentEvent::Added);
        graph.emit(id, ItemChange::Added);
        debug!(store = %self.core.id, item = %id, definition = %definition.id, "item created");
        Ok(id)
    }

    /// Owner exists, declares the socket (when it declares any) and the
    /// socket is free or held by `child` already.
    fn check_socket(&self, child: Option<ItemId>, owner: ItemId, socket: &SlotTag) -> Result<()> {
        let store = self.core.id;
        let Some(owner_item) = self.core.items.get_item(owner) else {
            return refuse(store, StoreError::ItemNotFound { id: owner });
        };
        if let Some(definition) = owner_item.definition()
            && definition.has_sockets()
            && !definition.declares_socket(socket)
        {
            return refuse(
                store,
                StoreError::UnknownSocket {
                    owner,
                    socket: socket.clone(),
                },
            );
        }
        if let Some(occupant) = self
            .item_attached_at(owner, socket)
            .map(|item| item.id())
            .filter(|occupant| Some(*occupant) != child)
        {
            return refuse(
                store,
                StoreError::SocketOccupied {
                    owner,
                    socket: socket.clone(),
                    occupant,
                },
            );
        }
        Ok(())
    }

    fn existing(&self, id: ItemId) -> Result<&ItemInstance> {
        match self.core.items.get_item(id) {
            Some(item) => Ok(item),
            None => refuse(self.core.id, StoreError::ItemNotFound { id }),
        }
    }

    /// Removes stacks or the whole item.
    ///
    /// A full removal takes every attached descendant with it, deepest
    /// first. Returns `true` when the item left the store.
    pub fn remove_item(
        &mut self,
        id: ItemId,
        amount: RemoveAmount,
        remove_on_zero: bool,
    ) -> Result<bool> {
        let result = self.remove_item_inner(id, amount, remove_on_zero);
        self.core.flush_events();
        result
    }

    fn remove_item_inner(
        &mut self,
        id: ItemId,
        amount: RemoveAmount,
        remove_on_zero: bool,
    ) -> Result<bool> {
        self.existing(id)?;
        let stacks = match amount {
            RemoveAmount::All => 0,
            RemoveAmount::Stacks(taken) => {
                let graph = self.core.reducer();
                let Some(item) = graph.items.get_item_mut(id) else {
                    return Ok(false);
                };
                item.stacks = item.stacks.saturating_sub(taken);
                item.stacks
            }
        };

        if amount == RemoveAmount::All || (stacks == 0 && remove_on_zero) {
            self.destroy(id);
            return Ok(true);
        }
        self.core.reducer().changed(id);
        Ok(false)
    }

    /// Releases `id` and its whole subtree, children before their owners.
    fn destroy(&mut self, id: ItemId) -> usize {
        let mut graph = self.core.reducer();
        let mut doomed = graph.descendants(id);
        doomed.reverse();
        doomed.push(id);
        let released = doomed
            .into_iter()
            .filter_map(|item| graph.release(item))
            .count();
        debug!(store = %self.core.id, item = %id, released, "item removed");
        released
    }

    /// Plugs `child` into `socket` on `owner`, leaving any previous owner.
    pub fn attach_item(
        &mut self,
        child: ItemId,
        owner: ItemId,
        socket: impl Into<SlotTag>,
    ) -> Result<()> {
        let result = self.attach_item_inner(child, owner, socket.into());
        self.core.flush_events();
        result
    }

    fn attach_item_inner(&mut self, child: ItemId, owner: ItemId, socket: SlotTag) -> Result<()> {
        let store = self.core.id;
        let item = self.existing(child)?;
        let previous = item.owner();
        let previous_socket = item.attached_to_slot().cloned();
        if previous == Some(owner) && previous_socket.as_ref() == Some(&socket) {
            return Ok(());
        }
        if let Some(slot) = item.slot().cloned() {
            return refuse(store, StoreError::ItemSlotted { id: child, slot });
        }
        self.check_socket(Some(child), owner, &socket)?;

        let max = self.core.config.max_attachment_depth;
        let mut graph = self.core.reducer();
        if owner == child || graph.ancestors(owner).contains(&child) {
            return refuse(store, StoreError::AttachmentCycle { owner, child });
        }
        if graph.ancestors(owner).len() + 1 + graph.subtree_height(child) > max {
            return refuse(store, StoreError::AttachmentTooDeep { owner, max });
        }

        if let Some(previous) = previous {
            graph.detach_from(child, previous);
            if graph.items.contains(previous) {
                graph.changed(previous);
            }
        }
        graph.attach(child, owner, socket);
        if let Some(item) = graph.items.get_item_mut(child)
            && previous.is_some()
        {
            item.old_owner = previous;
            item.old_attached_to_slot = previous_socket;
        }
        graph.changed(child);
        graph.changed(owner);
        Ok(())
    }

    /// Detaches `child` from its owner. `false` when it was standalone.
    pub fn detach_item(&mut self, child: ItemId) -> Result<bool> {
        let Some(owner) = self.existing(child)?.owner() else {
            return Ok(false);
        };
        let mut graph = self.core.reducer();
        graph.detach_from(child, owner);
        graph.changed(child);
        if graph.items.contains(owner) {
            graph.changed(owner);
        }
        drop(graph);
        self.core.flush_events();
        Ok(true)
    }

    fn slottable(&self, id: ItemId) -> Result<()> {
        if let Some(owner) = self.existing(id)?.owner() {
            return refuse(self.core.id, StoreError::ItemAttached { id, owner });
        }
        Ok(())
    }

    /// Places a standalone item in `slot`; re-slotting leaves the old slot first.
    pub fn add_to_slot(&mut self, id: ItemId, slot: impl Into<SlotTag>) -> Result<bool> {
        self.slottable(id)?;
        let moved = self.core.reducer().add_to_slot(id, slot.into());
        self.core.flush_events();
        Ok(moved)
    }

    pub fn remove_from_slot(&mut self, id: ItemId) -> Result<bool> {
        self.slottable(id)?;
        let moved = self.core.reducer().remove_from_slot(id);
        self.core.flush_events();
        Ok(moved)
    }

    /// Moves a slotted item straight to `slot` with a single "changed slot"
    /// notification.
    pub fn change_slot(&mut self, id: ItemId, slot: impl Into<SlotTag>) -> Result<bool> {
        self.slottable(id)?;
        let moved = self.core.reducer().change_slot(id, slot.into());
        self.core.flush_events();
        Ok(moved)
    }

    pub fn add_dynamic_tag(&mut self, id: ItemId, tag: impl Into<ItemTag>) -> Result<bool> {
        let tag = tag.into();
        self.update(id, move |item| item.dynamic_tags.insert(tag))
    }

    pub fn remove_dynamic_tag(&mut self, id: ItemId, tag: &ItemTag) -> Result<bool> {
        self.update(id, |item| item.dynamic_tags.remove(tag))
    }

    /// Replaces the instance payload of the same kind.
    pub fn set_instance_data(&mut self, id: ItemId, data: InstanceData) -> Result<bool> {
        self.update(id, move |item| {
            let kind = data.kind();
            if item.instances.get(&kind) == Some(&data) {
                return false;
            }
            item.instances.insert(kind, data);
            true
        })
    }

    pub fn set_level(&mut self, id: ItemId, level: u8) -> Result<bool> {
        self.update(id, |item| {
            let changed = item.level != level;
            item.level = level;
            changed
        })
    }

    /// Applies a field edit and announces it when it changed anything.
    fn update<F>(&mut self, id: ItemId, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut ItemInstance) -> bool,
    {
        self.existing(id)?;
        let mut graph = self.core.reducer();
        let changed = graph.items.get_item_mut(id).is_some_and(edit);
        if changed {
            graph.changed(id);
        }
        drop(graph);
        self.core.flush_events();
        Ok(changed)
    }

    /// Relocates `id` and its attached subtree from `source` into this store.
    ///
    /// Refused without touching either store when any id of the subtree
    /// already exists here. The moved root arrives standalone and unslotted.
    pub fn move_item_from(&mut self, id: ItemId, source: &mut AuthoritativeStore) -> Result<()> {
        source.existing(id)?;
        let mut subtree = vec![id];
        subtree.extend(source.core.reducer().descendants(id));
        if let Some(clash) = subtree.iter().find(|item| self.core.items.contains(**item)) {
            return refuse(self.core.id, StoreError::DuplicateItem { id: *clash });
        }

        let copies: Vec<ItemInstance> = subtree
            .iter()
            .filter_map(|item| source.core.items.get_item(*item).cloned())
            .collect();
        source.destroy(id);
        source.core.flush_events();

        for mut copy in copies {
            if copy.id == id {
                copy.old_owner = copy.owner.take();
                copy.old_attached_to_slot = copy.attached_to_slot.take();
                copy.old_slot = copy.slot.take();
            }
            copy.slot_phase = SlotPhase::Idle;
            copy.set_definition(self.core.definitions.definition(copy.definition_id));
            self.ids.observe(copy.id);
            self.core.items.insert(copy);
        }

        let mut graph = self.core.reducer();
        for item in subtree.iter().rev() {
            graph.refresh_tags(*item);
        }
        for item in subtree.iter().rev() {
            graph.notify(*item, FragmentEvent::Added);
            graph.emit(*item, ItemChange::Added);
        }
        drop(graph);
        debug!(from = %source.core.id, to = %self.core.id, item = %id, moved = subtree.len(), "item moved");
        self.core.flush_events();
        Ok(())
    }

    /// Drains everything changed since the last call into one delta.
    pub fn collect_delta(&mut self) -> Option<ReplicationDelta> {
        let delta = ReplicationDelta::drain(&mut self.core.items, self.core.id, self.sequence + 1);
        if delta.is_empty() {
            return None;
        }
        self.sequence += 1;
        trace!(store = %self.core.id, sequence = self.sequence, records = delta.len(), "delta collected");
        Some(delta)
    }

    /// Full-state delta for an observer that joins late.
    pub fn snapshot(&self) -> ReplicationDelta {
        ReplicationDelta::snapshot(&self.core.items, self.core.id, self.sequence)
    }
}

impl StoreQuery for AuthoritativeStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Fragment, SocketSlot, StaticDefinitions};
    use crate::events::StoreEvent;
    use crate::state::GraphState;

    const RIFLE: DefinitionId = DefinitionId(1);
    const SCOPE: DefinitionId = DefinitionId(2);
    const AMMO: DefinitionId = DefinitionId(3);
    const RELIC: DefinitionId = DefinitionId(4);

    fn store() -> AuthoritativeStore {
        let defs = StaticDefinitions::new()
            .with(
                ItemDefinition::new(RIFLE, "rifle").with_fragment(Fragment::SocketSlots(vec![
                    SocketSlot::new("Optic").with_default(SCOPE),
                    SocketSlot::new("Barrel"),
                ])),
            )
            .with(ItemDefinition::new(SCOPE, "scope").with_tag("optic"))
            .with(
                ItemDefinition::new(AMMO, "ammo")
                    .with_stack_method(StackMethod::ByType { max_stacks: 30 }),
            )
            .with(ItemDefinition::new(RELIC, "relic").with_stack_method(StackMethod::Unique));
        AuthoritativeStore::new(
            StoreId(1),
            Arc::new(defs),
            Arc::new(FragmentRegistry::new()),
            StoreConfig::default(),
        )
    }

    #[test]
    fn default_occupants_are_created_and_attached() {
        let mut store = store();
        let rifle = store.add_item(&ItemSpec::new(RIFLE), None).unwrap();

        let attached = store.attached_items(rifle);
        assert_eq!(attached.len(), 1);
        assert_eq!(attached[0].definition_id(), SCOPE);
        assert_eq!(attached[0].attached_to_slot(), Some(&SlotTag::new("Optic")));
        assert!(store.get_item(rifle).unwrap().has_tag(&ItemTag::new("optic")));
    }

    #[test]
    fn by_type_adds_merge_then_overflow() {
        let mut store = store();
        let first = store
            .add_item(&ItemSpec::new(AMMO).with_amount(20), None)
            .unwrap();
        let merged = store
            .add_item(&ItemSpec::new(AMMO).with_amount(25), None)
            .unwrap();

        assert_eq!(merged, first);
        assert_eq!(store.get_item(first).unwrap().stacks(), 30);
        assert_eq!(store.items_by_definition(AMMO).len(), 2);
        assert_eq!(store.count_by_definition(AMMO), 45);
    }

    #[test]
    fn unique_definition_refuses_a_second_item() {
        let mut store = store();
        let relic = store.add_item(&ItemSpec::new(RELIC), None).unwrap();
        let err = store.add_item(&ItemSpec::new(RELIC), None).unwrap_err();
        assert_eq!(
            err,
            StoreError::UniqueItemExists {
                definition: RELIC,
                existing: relic
            }
        );
    }

    #[test]
    fn stacks_reach_zero_without_removal_when_asked() {
        let mut store = store();
        let ammo = store
            .add_item(&ItemSpec::new(AMMO).with_amount(5), None)
            .unwrap();

        assert!(!store.remove_item(ammo, RemoveAmount::Stacks(5), false).unwrap());
        assert_eq!(store.get_item(ammo).unwrap().stacks(), 0);
        assert!(store.remove_item(ammo, RemoveAmount::Stacks(1), true).unwrap());
        assert!(!store.contains(ammo));
    }

    #[test]
    fn attach_refuses_undeclared_and_occupied_sockets() {
        let mut store = store();
        let rifle = store.add_item(&ItemSpec::new(RIFLE), None).unwrap();
        let scope = store.add_item(&ItemSpec::new(SCOPE), None).unwrap();

        assert!(matches!(
            store.attach_item(scope, rifle, "Stock"),
            Err(StoreError::UnknownSocket { .. })
        ));
        assert!(matches!(
            store.attach_item(scope, rifle, "Optic"),
            Err(StoreError::SocketOccupied { .. })
        ));
        store.attach_item(scope, rifle, "Barrel").unwrap();
        assert_eq!(store.get_item(scope).unwrap().graph_state(), GraphState::Attached);
    }

    #[test]
    fn attach_refuses_cycles() {
        let mut store = store();
        let a = store.add_item(&ItemSpec::new(SCOPE), None).unwrap();
        let b = store.add_item(&ItemSpec::new(SCOPE), None).unwrap();
        store.attach_item(b, a, "Mount").unwrap();

        assert_eq!(
            store.attach_item(a, b, "Mount"),
            Err(StoreError::AttachmentCycle { owner: b, child: a })
        );
        assert_eq!(store.get_item(a).unwrap().owner(), None);
    }

    #[test]
    fn attached_items_cannot_be_slotted() {
        let mut store = store();
        let rifle = store.add_item(&ItemSpec::new(RIFLE), None).unwrap();
        let scope = store.attached_items(rifle)[0].id();

        assert_eq!(
            store.add_to_slot(scope, "Head"),
            Err(StoreError::ItemAttached {
                id: scope,
                owner: rifle
            })
        );
        assert_eq!(store.get_item(scope).unwrap().slot(), None);
    }

    #[test]
    fn events_reach_listeners_after_the_operation() {
        let mut store = store();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.listeners().on_any(move |event| {
            if let StoreEvent::Item { change, .. } = event {
                sink.lock().unwrap().push(change.clone());
            }
        });

        store.add_item(&ItemSpec::new(RIFLE), None).unwrap();
        let seen = seen.lock().unwrap();
        let attached = seen
            .iter()
            .position(|change| matches!(change, ItemChange::Attached { .. }));
        assert!(attached.is_some());
        assert_eq!(seen.last(), Some(&ItemChange::Added));
        assert!(attached < seen.iter().rposition(|change| *change == ItemChange::Added));
    }

    #[test]
    fn deltas_carry_removals_before_changes() {
        let mut store = store();
        let rifle = store.add_item(&ItemSpec::new(RIFLE), None).unwrap();
        let first = store.collect_delta().unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.len(), 2);
        assert!(store.collect_delta().is_none());

        store.remove_item(rifle, RemoveAmount::All, true).unwrap();
        let second = store.collect_delta().unwrap();
        assert_eq!(second.sequence, 2);
        assert!(second
            .records
            .iter()
            .all(|record| matches!(record, crate::state::ReplicationRecord::Remove(_))));
        assert_eq!(second.records.last().map(|record| record.id()), Some(rifle));
    }

    #[test]
    fn move_refuses_id_collisions() {
        let mut source = store();
        let mut target = store();
        let spec = ItemSpec::new(SCOPE).with_id(ItemId(77));
        source.add_item(&spec, None).unwrap();
        target.add_item(&spec, None).unwrap();

        assert_eq!(
            target.move_item_from(ItemId(77), &mut source),
            Err(StoreError::DuplicateItem { id: ItemId(77) })
        );
        assert!(source.contains(ItemId(77)));
    }
}
