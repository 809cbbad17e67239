//! Item lifecycle events exposed to collaborators.
//!
//! Stores queue events while an operation runs and hand them to
//! [`EventListeners`] only once the operation has finished, so a listener
//! never observes a half-initialised item.
use core::fmt;
use std::collections::HashMap;

use crate::state::{ItemId, SlotTag, StoreId};

/// What happened to one item.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ItemChange {
    Added,
    Changed { version: u32 },
    Removed,
    AddedToSlot { slot: SlotTag },
    RemovedFromSlot { slot: SlotTag },
    SlotChanged { old: SlotTag, new: SlotTag },
    Attached { owner: ItemId, socket: SlotTag },
    Detached { owner: ItemId, socket: Option<SlotTag> },
}

/// Subject of an advisory lock on an observer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LockTarget {
    Item(ItemId),
    Slot(SlotTag),
    AttachmentSlot { owner: ItemId, socket: SlotTag },
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StoreEvent {
    Item {
        store: StoreId,
        item: ItemId,
        change: ItemChange,
    },
    LockChanged {
        store: StoreId,
        target: LockTarget,
        locked: bool,
    },
}

impl StoreEvent {
    pub fn store(&self) -> StoreId {
        match self {
            Self::Item { store, .. } | Self::LockChanged { store, .. } => *store,
        }
    }

    /// Item the event is keyed under for per-id listeners.
    pub fn item(&self) -> Option<ItemId> {
        match self {
            Self::Item { item, .. } => Some(*item),
            Self::LockChanged {
                target: LockTarget::Item(item),
                ..
            } => Some(*item),
            Self::LockChanged { .. } => None,
        }
    }
}

/// Handle returned on registration, used to remove a listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&StoreEvent) + Send>;

/// Global and per-item listener lists.
#[derive(Default)]
pub struct EventListeners {
    next: u64,
    global: Vec<(ListenerId, Listener)>,
    per_item: HashMap<ItemId, Vec<(ListenerId, Listener)>>,
}

impl EventListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener receiving every event of the store.
    pub fn on_any<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&StoreEvent) + Send + 'static,
    {
        let id = self.allocate();
        self.global.push((id, Box::new(listener)));
        id
    }

    /// Registers a listener receiving only events keyed under `item`.
    pub fn on_item<F>(&mut self, item: ItemId, listener: F) -> ListenerId
    where
        F: FnMut(&StoreEvent) + Send + 'static,
    {
        let id = self.allocate();
        self.per_item
            .entry(item)
            .or_default()
            .push((id, Box::new(listener)));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.len();
        self.global.retain(|(listener, _)| *listener != id);
        self.per_item.retain(|_, listeners| {
            listeners.retain(|(listener, _)| *listener != id);
            !listeners.is_empty()
        });
        before != self.len()
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.per_item.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Global listeners first, then listeners of the event's item.
    pub fn dispatch(&mut self, event: &StoreEvent) {
        for (_, listener) in &mut self.global {
            listener(event);
        }
        if let Some(item) = event.item()
            && let Some(listeners) = self.per_item.get_mut(&item)
        {
            for (_, listener) in listeners {
                listener(event);
            }
        }
    }

    fn allocate(&mut self) -> ListenerId {
        self.next += 1;
        ListenerId(self.next)
    }
}

impl fmt::Debug for EventListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("global", &self.global.len())
            .field("per_item", &self.per_item.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn added(item: u64) -> StoreEvent {
        StoreEvent::Item {
            store: StoreId(1),
            item: ItemId(item),
            change: ItemChange::Added,
        }
    }

    #[test]
    fn per_item_listeners_only_see_their_item() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = EventListeners::new();

        let sink = Arc::clone(&seen);
        listeners.on_item(ItemId(2), move |event| sink.lock().unwrap().push(event.item()));
        let sink = Arc::clone(&seen);
        listeners.on_any(move |_| sink.lock().unwrap().push(None));

        listeners.dispatch(&added(1));
        listeners.dispatch(&added(2));

        assert_eq!(*seen.lock().unwrap(), vec![None, None, Some(ItemId(2))]);
    }

    #[test]
    fn removed_listeners_stop_receiving() {
        let count = Arc::new(Mutex::new(0));
        let mut listeners = EventListeners::new();
        let sink = Arc::clone(&count);
        let id = listeners.on_item(ItemId(1), move |_| *sink.lock().unwrap() += 1);

        listeners.dispatch(&added(1));
        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        listeners.dispatch(&added(1));

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(listeners.is_empty());
    }

    #[test]
    fn slot_locks_are_not_keyed_by_item() {
        let event = StoreEvent::LockChanged {
            store: StoreId(1),
            target: LockTarget::Slot(SlotTag::new("Head")),
            locked: true,
        };
        assert_eq!(event.item(), None);
        assert_eq!(event.store(), StoreId(1));
    }
}
