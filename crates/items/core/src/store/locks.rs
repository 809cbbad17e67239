use std::collections::HashSet;

use crate::events::LockTarget;
use crate::state::{ItemId, SlotTag};

/// Advisory locks for requests an observer has sent but not seen confirmed.
///
/// A lock marks its target as busy for gameplay and UI callers; it never
/// blocks store operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LockSet {
    items: HashSet<ItemId>,
    slots: HashSet<SlotTag>,
    attachment_slots: HashSet<(ItemId, SlotTag)>,
}

impl LockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the lock was newly taken.
    pub fn lock(&mut self, target: &LockTarget) -> bool {
        match target {
            LockTarget::Item(id) => self.items.insert(*id),
            LockTarget::Slot(slot) => self.slots.insert(slot.clone()),
            LockTarget::AttachmentSlot { owner, socket } => {
                self.attachment_slots.insert((*owner, socket.clone()))
            }
        }
    }

    /// Returns `true` when a held lock was released.
    pub fn unlock(&mut self, target: &LockTarget) -> bool {
        match target {
            LockTarget::Item(id) => self.items.remove(id),
            LockTarget::Slot(slot) => self.slots.remove(slot),
            LockTarget::AttachmentSlot { owner, socket } => {
                self.attachment_slots.remove(&(*owner, socket.clone()))
            }
        }
    }

    pub fn is_locked(&self, target: &LockTarget) -> bool {
        match target {
            LockTarget::Item(id) => self.items.contains(id),
            LockTarget::Slot(slot) => self.slots.contains(slot),
            LockTarget::AttachmentSlot { owner, socket } => {
                self.attachment_slots.contains(&(*owner, socket.clone()))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len() + self.slots.len() + self.attachment_slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_and_unlock_report_transitions() {
        let mut locks = LockSet::new();
        let target = LockTarget::AttachmentSlot {
            owner: ItemId(1),
            socket: SlotTag::new("Barrel"),
        };

        assert!(locks.lock(&target));
        assert!(!locks.lock(&target));
        assert!(locks.is_locked(&target));
        assert!(!locks.is_locked(&LockTarget::Item(ItemId(1))));

        assert!(locks.unlock(&target));
        assert!(!locks.unlock(&target));
        assert!(locks.is_empty());
    }
}
