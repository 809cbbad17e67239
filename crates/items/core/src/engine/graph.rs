//! Owner/attachment and slot transitions over an [`ItemCollection`].
//!
//! [`GraphReducer`] borrows one store's collection for the duration of a
//! single operation. Authoritative reducers write the link fields and mark
//! records dirty; observer reducers only maintain forward edges and
//! notifications, because observers receive link fields from replication.
//!
//! Attachments and standalone slots share one notification vocabulary: when
//! an owner enters a slot, everything plugged into its sockets receives the
//! same "added to slot" notification.
use std::collections::{BTreeSet, HashSet};

use super::fragments::{FragmentEvent, FragmentRegistry};
use crate::events::{ItemChange, StoreEvent};
use crate::state::{ItemCollection, ItemId, ItemInstance, SlotPhase, SlotTag, StoreId};

/// Bound on owner-chain walks; deeper chains can only come from corrupt data.
const CHAIN_LIMIT: usize = 64;

pub(crate) struct GraphReducer<'a> {
    pub(crate) items: &'a mut ItemCollection,
    fragments: &'a FragmentRegistry,
    events: &'a mut Vec<StoreEvent>,
    store: StoreId,
    authority: bool,
}

impl<'a> GraphReducer<'a> {
    pub(crate) fn new(
        items: &'a mut ItemCollection,
        fragments: &'a FragmentRegistry,
        events: &'a mut Vec<StoreEvent>,
        store: StoreId,
    ) -> Self {
        let authority = items.is_tracked();
        Self {
            items,
            fragments,
            events,
            store,
            authority,
        }
    }

    pub(crate) fn notify(&self, id: ItemId, event: FragmentEvent) {
        if let Some(item) = self.items.get_item(id) {
            self.fragments.dispatch(item, &event);
        }
    }

    pub(crate) fn emit(&mut self, item: ItemId, change: ItemChange) {
        self.events.push(StoreEvent::Item {
            store: self.store,
            item,
            change,
        });
    }

    /// Marks dirty (authority only), notifies `Changed` and queues the event.
    pub(crate) fn changed(&mut self, id: ItemId) {
        self.items.mark_dirty(id);
        let Some(version) = self.items.get_item(id).map(|item| item.version()) else {
            return;
        };
        self.notify(id, FragmentEvent::Changed);
        self.emit(id, ItemChange::Changed { version });
    }

    /// Slot of the item, or of the first slotted ancestor for attachments.
    pub(crate) fn effective_slot(&self, id: ItemId) -> Option<SlotTag> {
        let mut current = self.items.get_item(id)?;
        for _ in 0..CHAIN_LIMIT {
            match current.owner() {
                Some(owner) => current = self.items.get_item(owner)?,
                None => return current.slot().cloned(),
            }
        }
        None
    }

    /// Resolvable ancestors of `id`, nearest first.
    pub(crate) fn ancestors(&self, id: ItemId) -> Vec<ItemId> {
        let mut chain = Vec::new();
        let mut current = self.items.get_item(id).and_then(|item| item.owner());
        while let Some(owner) = current {
            if chain.len() >= CHAIN_LIMIT || chain.contains(&owner) {
                break;
            }
            let Some(item) = self.items.get_item(owner) else {
                break;
            };
            chain.push(owner);
            current = item.owner();
        }
        chain
    }

    /// Resolvable descendants of `id` in depth-first pre-order.
    pub(crate) fn descendants(&self, id: ItemId) -> Vec<ItemId> {
        let mut order = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut stack: Vec<ItemId> = self
            .items
            .get_item(id)
            .map(|item| item.attached_items().iter().rev().copied().collect())
            .unwrap_or_default();

        while let Some(next) = stack.pop() {
            if !visited.insert(next) {
                continue;
            }
            let Some(item) = self.items.get_item(next) else {
                continue;
            };
            order.push(next);
            stack.extend(item.attached_items().iter().rev().copied());
        }
        order
    }

    /// Height of the subtree rooted at `id` (1 for a leaf).
    pub(crate) fn subtree_height(&self, id: ItemId) -> usize {
        let mut height = 1;
        for child in self.descendants(id) {
            let below = self.ancestors(child).iter().take_while(|a| **a != id).count() + 2;
            height = height.max(below);
        }
        height
    }

    fn set_phase(&mut self, id: ItemId, phase: SlotPhase) -> bool {
        match self.items.get_item_mut(id) {
            Some(item) if item.slot_phase != phase => {
                item.slot_phase = phase;
                true
            }
            _ => false,
        }
    }

    /// Delivers "added to slot" to `id` and its descendants not already in a slot.
    pub(crate) fn fire_slot_added(&mut self, id: ItemId, slot: &SlotTag) {
        let mut targets = vec![id];
        targets.extend(self.descendants(id));
        for target in targets {
            if self.set_phase(target, SlotPhase::Added) {
                self.notify(target, FragmentEvent::AddedToSlot { slot: slot.clone() });
            }
        }
    }

    /// Delivers "removed from slot" to `id` and its descendants currently in a slot.
    pub(crate) fn fire_slot_removed(&mut self, id: ItemId, slot: &SlotTag) {
        let mut targets = vec![id];
        targets.extend(self.descendants(id));
        for target in targets {
            let in_slot = self
                .items
                .get_item(target)
                .is_some_and(|item| item.slot_phase == SlotPhase::Added);
            if in_slot && self.set_phase(target, SlotPhase::Removed) {
                self.notify(target, FragmentEvent::RemovedFromSlot { slot: slot.clone() });
            }
        }
    }

    pub(crate) fn fire_slot_changed(&mut self, id: ItemId, new: &SlotTag, old: &SlotTag) {
        let mut targets = vec![id];
        targets.extend(self.descendants(id));
        for target in targets {
            self.set_phase(target, SlotPhase::Added);
            self.notify(
                target,
                FragmentEvent::ChangedSlot {
                    new: new.clone(),
                    old: old.clone(),
                },
            );
        }
    }

    /// Recomputes aggregated tags of `id` and every ancestor.
    pub(crate) fn refresh_tags(&mut self, id: ItemId) {
        let mut chain = vec![id];
        chain.extend(self.ancestors(id));
        for target in chain {
            let Some(item) = self.items.get_item(target) else {
                continue;
            };
            let mut tags: BTreeSet<_> = item
                .definition()
                .map(|def| def.all_tags().cloned().collect())
                .unwrap_or_default();
            for child in item.attached_items() {
                if let Some(child) = self.items.get_item(*child) {
                    tags.extend(child.aggregated_tags().iter().cloned());
                }
            }
            if let Some(item) = self.items.get_item_mut(target) {
                item.aggregated_tags = tags;
            }
        }
    }

    /// Links `child` under `owner` at `socket`.
    ///
    /// Callers validate policy first and follow up with [`Self::changed`]
    /// for the child, then the owner. Returns `false` if either side is
    /// missing.
    pub(crate) fn attach(&mut self, child: ItemId, owner: ItemId, socket: SlotTag) -> bool {
        if !self.items.contains(owner) {
            return false;
        }
        let Some(item) = self.items.get_item_mut(child) else {
            return false;
        };
        if self.authority {
            item.old_owner = item.owner;
            item.owner = Some(owner);
            item.old_attached_to_slot = item.attached_to_slot.take();
            item.attached_to_slot = Some(socket.clone());
        }
        if let Some(owner_item) = self.items.get_item_mut(owner) {
            owner_item.link_child(child);
        }
        self.refresh_tags(owner);

        self.notify(child, FragmentEvent::AttachedTo { owner });
        self.emit(child, ItemChange::Attached { owner, socket });
        if let Some(slot) = self.effective_slot(owner) {
            self.fire_slot_added(child, &slot);
        }
        true
    }

    /// Unlinks `child` from `owner`, which may already be gone.
    ///
    /// Never fails: a vanished owner only means there is no forward edge to
    /// remove. Authoritative reducers move the link into the `old_*` fields.
    /// Callers follow up with [`Self::changed`] as for [`Self::attach`].
    pub(crate) fn detach_from(&mut self, child: ItemId, owner: ItemId) -> bool {
        let Some(socket) = self
            .items
            .get_item(child)
            .map(|item| item.attached_to_slot().cloned())
        else {
            return false;
        };

        let owner_present = self.items.contains(owner);
        if owner_present {
            if let Some(slot) = self.effective_slot(owner) {
                self.fire_slot_removed(child, &slot);
            }
            if let Some(owner_item) = self.items.get_item_mut(owner) {
                owner_item.unlink_child(child);
            }
            self.refresh_tags(owner);
        }
        self.notify(child, FragmentEvent::DetachedFrom { owner });

        if self.authority
            && let Some(item) = self.items.get_item_mut(child)
        {
            item.old_owner = Some(owner);
            item.owner = None;
            item.old_attached_to_slot = item.attached_to_slot.take();
        }
        self.emit(child, ItemChange::Detached { owner, socket });
        true
    }

    /// Detaches from the current owner. `false` when standalone.
    pub(crate) fn detach(&mut self, child: ItemId) -> bool {
        match self.items.get_item(child).and_then(|item| item.owner()) {
            Some(owner) => self.detach_from(child, owner),
            None => false,
        }
    }

    /// Unlinks and removes one item. Children are not touched.
    ///
    /// Pre-remove hooks run first, then the item leaves its owner or slot,
    /// then storage removal.
    pub(crate) fn release(&mut self, id: ItemId) -> Option<ItemInstance> {
        let (owner, slot) = self
            .items
            .get_item(id)
            .map(|item| (item.owner(), item.slot().cloned()))?;
        self.notify(id, FragmentEvent::PreRemove);
        match (owner, slot) {
            (Some(owner), _) => {
                self.detach_from(id, owner);
                if self.items.contains(owner) {
                    self.changed(owner);
                }
            }
            (None, Some(slot)) => self.announce_slot_removed(id, slot),
            (None, None) => {}
        }
        let removed = self.items.remove_item(id);
        self.emit(id, ItemChange::Removed);
        removed
    }

    pub(crate) fn announce_slot_added(&mut self, id: ItemId, slot: SlotTag) {
        self.fire_slot_added(id, &slot);
        self.emit(id, ItemChange::AddedToSlot { slot });
    }

    pub(crate) fn announce_slot_removed(&mut self, id: ItemId, slot: SlotTag) {
        self.fire_slot_removed(id, &slot);
        self.emit(id, ItemChange::RemovedFromSlot { slot });
    }

    pub(crate) fn announce_slot_changed(&mut self, id: ItemId, new: SlotTag, old: SlotTag) {
        self.fire_slot_changed(id, &new, &old);
        self.emit(id, ItemChange::SlotChanged { old, new });
    }

    /// Places a standalone item in `slot`, leaving any previous slot first.
    pub(crate) fn add_to_slot(&mut self, id: ItemId, slot: SlotTag) -> bool {
        let Some(current) = self.items.get_item(id).map(|item| item.slot().cloned()) else {
            return false;
        };
        if current.as_ref() == Some(&slot) {
            return false;
        }
        if let Some(previous) = current.clone() {
            self.announce_slot_removed(id, previous);
        }
        if let Some(item) = self.items.get_item_mut(id) {
            item.old_slot = current;
            item.slot = Some(slot.clone());
        }
        self.announce_slot_added(id, slot);
        self.changed(id);
        true
    }

    pub(crate) fn remove_from_slot(&mut self, id: ItemId) -> bool {
        let Some(slot) = self.items.get_item(id).and_then(|item| item.slot().cloned()) else {
            return false;
        };
        self.announce_slot_removed(id, slot.clone());
        if let Some(item) = self.items.get_item_mut(id) {
            item.old_slot = item.slot.take();
        }
        self.changed(id);
        true
    }

    /// Moves a slotted item straight to `new`; an unslotted item is added instead.
    pub(crate) fn change_slot(&mut self, id: ItemId, new: SlotTag) -> bool {
        let Some(current) = self.items.get_item(id).map(|item| item.slot().cloned()) else {
            return false;
        };
        let Some(old) = current else {
            return self.add_to_slot(id, new);
        };
        if old == new {
            return false;
        }
        if let Some(item) = self.items.get_item_mut(id) {
            item.old_slot = Some(old.clone());
            item.slot = Some(new.clone());
        }
        self.announce_slot_changed(id, new, old);
        self.changed(id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ItemDefinition, StaticDefinitions};
    use crate::state::{DefinitionId, ItemSpec, ItemTag};

    fn collection(ids: &[u64]) -> ItemCollection {
        let defs = StaticDefinitions::new()
            .with(ItemDefinition::new(DefinitionId(1), "frame").with_tag("frame"))
            .with(ItemDefinition::new(DefinitionId(2), "gem").with_tag("gem"));
        let mut items = ItemCollection::new();
        for raw in ids {
            let definition = if *raw == 1 { 1 } else { 2 };
            items.add_item(&ItemSpec::new(DefinitionId(definition)), ItemId(*raw), &defs);
        }
        items
    }

    #[test]
    fn attach_links_both_directions_and_aggregates_tags() {
        let mut items = collection(&[1, 2]);
        let registry = FragmentRegistry::new();
        let mut events = Vec::new();
        let mut graph = GraphReducer::new(&mut items, &registry, &mut events, StoreId(1));

        assert!(graph.attach(ItemId(2), ItemId(1), SlotTag::new("Socket")));
        drop(graph);

        let owner = items.get_item(ItemId(1)).unwrap();
        let child = items.get_item(ItemId(2)).unwrap();
        assert_eq!(owner.attached_items(), &[ItemId(2)]);
        assert_eq!(child.owner(), Some(ItemId(1)));
        assert_eq!(child.attached_to_slot(), Some(&SlotTag::new("Socket")));
        assert!(owner.has_tag(&ItemTag::new("gem")));
        assert!(matches!(
            events.first(),
            Some(StoreEvent::Item {
                change: ItemChange::Attached { .. },
                ..
            })
        ));
    }

    #[test]
    fn detach_from_vanished_owner_still_clears_the_child() {
        let mut items = collection(&[1, 2]);
        let registry = FragmentRegistry::new();
        let mut events = Vec::new();
        let mut graph = GraphReducer::new(&mut items, &registry, &mut events, StoreId(1));
        graph.attach(ItemId(2), ItemId(1), SlotTag::new("Socket"));
        graph.items.remove_item(ItemId(1));

        assert!(graph.detach(ItemId(2)));
        drop(graph);

        let child = items.get_item(ItemId(2)).unwrap();
        assert_eq!(child.owner(), None);
        assert_eq!(child.old_owner(), Some(ItemId(1)));
        assert_eq!(child.attached_to_slot(), None);
        assert_eq!(child.old_attached_to_slot(), Some(&SlotTag::new("Socket")));
    }

    #[test]
    fn effective_slot_follows_the_owner_chain() {
        let mut items = collection(&[1, 2, 3]);
        let registry = FragmentRegistry::new();
        let mut events = Vec::new();
        let mut graph = GraphReducer::new(&mut items, &registry, &mut events, StoreId(1));

        graph.add_to_slot(ItemId(1), SlotTag::new("Hands"));
        graph.attach(ItemId(2), ItemId(1), SlotTag::new("A"));
        graph.attach(ItemId(3), ItemId(2), SlotTag::new("B"));

        assert_eq!(graph.effective_slot(ItemId(3)), Some(SlotTag::new("Hands")));
        assert_eq!(graph.ancestors(ItemId(3)), vec![ItemId(2), ItemId(1)]);
        assert_eq!(graph.descendants(ItemId(1)), vec![ItemId(2), ItemId(3)]);
        assert_eq!(graph.subtree_height(ItemId(1)), 3);
        assert_eq!(graph.subtree_height(ItemId(3)), 1);
        drop(graph);

        let leaf = items.get_item(ItemId(3)).unwrap();
        assert_eq!(leaf.slot_phase(), SlotPhase::Added);
    }

    #[test]
    fn change_slot_records_previous_slot() {
        let mut items = collection(&[1]);
        let registry = FragmentRegistry::new();
        let mut events = Vec::new();
        let mut graph = GraphReducer::new(&mut items, &registry, &mut events, StoreId(1));

        assert!(graph.change_slot(ItemId(1), SlotTag::new("Belt")));
        assert!(graph.change_slot(ItemId(1), SlotTag::new("Back")));
        assert!(!graph.change_slot(ItemId(1), SlotTag::new("Back")));
        drop(graph);

        let item = items.get_item(ItemId(1)).unwrap();
        assert_eq!(item.slot(), Some(&SlotTag::new("Back")));
        assert_eq!(item.old_slot(), Some(&SlotTag::new("Belt")));
        assert!(events.iter().any(|event| matches!(
            event,
            StoreEvent::Item {
                change: ItemChange::SlotChanged { .. },
                ..
            }
        )));
    }
}
