//! Generational arena owning every [`ItemInstance`] of one store.
//!
//! Storage slots are reused after removal; each reuse bumps the slot's
//! generation so a stale [`SlotKey`] can never observe the new occupant.
//! Callers address items by [`ItemId`] through the index map and must
//! treat a missing id as a normal transient state.

use std::collections::{HashMap, HashSet};

use super::instance::ItemInstance;
use super::spec::ItemSpec;
use super::types::ItemId;
use crate::env::DefinitionOracle;

/// Storage position of an item, valid until that item is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotKey {
    index: u32,
    generation: u32,
}

impl SlotKey {
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Clone, Debug)]
struct Entry {
    generation: u32,
    item: Option<ItemInstance>,
}

/// Changes accumulated since the last replication drain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct PendingChanges {
    /// Ids removed since the last drain, in removal order.
    pub removed: Vec<ItemId>,
    /// Ids marked dirty, in first-mark order, flagged when newly added.
    pub dirty: Vec<(ItemId, bool)>,
}

/// Per-store item storage with id lookup and dirty tracking.
#[derive(Clone, Debug)]
pub struct ItemCollection {
    entries: Vec<Entry>,
    free: Vec<u32>,
    index: HashMap<ItemId, SlotKey>,
    tracked: bool,
    dirty: Vec<ItemId>,
    added: HashSet<ItemId>,
    removed: Vec<ItemId>,
}

impl ItemCollection {
    /// Authoritative collection: records dirty items and removals.
    pub fn new() -> Self {
        Self::with_tracking(true)
    }

    /// Observer collection: contents mirror replication, nothing is recorded.
    pub fn replica() -> Self {
        Self::with_tracking(false)
    }

    fn with_tracking(tracked: bool) -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            tracked,
            dirty: Vec::new(),
            added: HashSet::new(),
            removed: Vec::new(),
        }
    }

    pub fn is_tracked(&self) -> bool {
        self.tracked
    }

    /// Constructs and stores an item from `spec` under `id`.
    ///
    /// Returns `None` when the spec's definition cannot be resolved or the
    /// id is invalid or already present.
    pub fn add_item(
        &mut self,
        spec: &ItemSpec,
        id: ItemId,
        definitions: &dyn DefinitionOracle,
    ) -> Option<ItemId> {
        let definition = definitions.definition(spec.definition)?;
        let instance = ItemInstance::from_spec(id, spec, definition);
        self.insert(instance).map(|_| id)
    }

    /// Stores a fully built instance. `None` on invalid or duplicate id.
    pub fn insert(&mut self, instance: ItemInstance) -> Option<SlotKey> {
        let id = instance.id;
        if !id.is_valid() || self.index.contains_key(&id) {
            return None;
        }

        let key = match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                debug_assert!(entry.item.is_none(), "free list points at a live entry");
                entry.item = Some(instance);
                SlotKey {
                    index,
                    generation: entry.generation,
                }
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(Entry {
                    generation: 0,
                    item: Some(instance),
                });
                SlotKey {
                    index,
                    generation: 0,
                }
            }
        };

        self.index.insert(id, key);
        if self.tracked {
            self.added.insert(id);
            self.push_dirty(id);
        }
        Some(key)
    }

    /// Removes an item. Attached children are left untouched.
    pub fn remove_item(&mut self, id: ItemId) -> Option<ItemInstance> {
        let key = self.index.remove(&id)?;
        let entry = self.entries.get_mut(key.index as usize)?;
        debug_assert_eq!(entry.generation, key.generation, "index map drifted from storage");

        let item = entry.item.take();
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(key.index);

        if self.tracked {
            self.dirty.retain(|dirty| *dirty != id);
            // never replicated, observers have nothing to remove
            if !self.added.remove(&id) {
                self.removed.push(id);
            }
        }
        item
    }

    pub fn get_item(&self, id: ItemId) -> Option<&ItemInstance> {
        let key = self.index.get(&id)?;
        self.get_by_key(*key)
    }

    pub fn get_item_mut(&mut self, id: ItemId) -> Option<&mut ItemInstance> {
        let key = *self.index.get(&id)?;
        let entry = self.entries.get_mut(key.index as usize)?;
        if entry.generation != key.generation {
            return None;
        }
        entry.item.as_mut()
    }

    pub fn key_of(&self, id: ItemId) -> Option<SlotKey> {
        self.index.get(&id).copied()
    }

    /// Resolves a storage key, `None` once its item has been removed.
    pub fn get_by_key(&self, key: SlotKey) -> Option<&ItemInstance> {
        let entry = self.entries.get(key.index as usize)?;
        if entry.generation != key.generation {
            return None;
        }
        entry.item.as_ref()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Flags an item for the next replication delta and advances its version.
    ///
    /// No-op on replica collections, whose versions come from the authority.
    pub fn mark_dirty(&mut self, id: ItemId) -> bool {
        if !self.tracked {
            return false;
        }
        let Some(item) = self.get_item_mut(id) else {
            return false;
        };
        item.version = item.version.wrapping_add(1);
        self.push_dirty(id);
        true
    }

    pub fn is_dirty(&self, id: ItemId) -> bool {
        self.dirty.contains(&id)
    }

    fn push_dirty(&mut self, id: ItemId) {
        if !self.dirty.contains(&id) {
            self.dirty.push(id);
        }
    }

    pub(crate) fn take_changes(&mut self) -> PendingChanges {
        let removed = std::mem::take(&mut self.removed);
        let added = std::mem::take(&mut self.added);
        let dirty = std::mem::take(&mut self.dirty)
            .into_iter()
            .map(|id| (id, added.contains(&id)))
            .collect();
        PendingChanges { removed, dirty }
    }

    /// Linear scan; collections hold tens of items, not millions.
    pub fn items_where<P>(&self, mut predicate: P) -> Vec<&ItemInstance>
    where
        P: FnMut(&ItemInstance) -> bool,
    {
        self.iter().filter(|item| predicate(item)).collect()
    }

    /// Live items in storage order.
    pub fn iter(&self) -> impl Iterator<Item = &ItemInstance> + '_ {
        self.entries.iter().filter_map(|entry| entry.item.as_ref())
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.iter().map(ItemInstance::id).collect()
    }

    /// Checks that every index entry points at a live item with that id.
    pub fn is_consistent(&self) -> bool {
        let live = self.entries.iter().filter(|e| e.item.is_some()).count();
        live == self.index.len()
            && self
                .index
                .iter()
                .all(|(id, key)| self.get_by_key(*key).is_some_and(|item| item.id == *id))
    }
}

impl Default for ItemCollection {
    fn default() -> Self {
        Self::new()
    }
}
