use std::collections::HashMap;

use crate::state::ItemId;

/// Children that arrived before the owner they reference.
///
/// Keyed by the awaited owner id and drained right after that id is
/// inserted. A child waits for at most one owner at a time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingAttachments {
    waiting: HashMap<ItemId, Vec<ItemId>>,
}

impl PendingAttachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait(&mut self, owner: ItemId, child: ItemId) {
        self.cancel(child);
        self.waiting.entry(owner).or_default().push(child);
    }

    /// Removes and returns every child waiting for `owner`, in arrival order.
    pub fn take(&mut self, owner: ItemId) -> Vec<ItemId> {
        self.waiting.remove(&owner).unwrap_or_default()
    }

    pub fn cancel(&mut self, child: ItemId) -> bool {
        let mut cancelled = false;
        self.waiting.retain(|_, children| {
            let before = children.len();
            children.retain(|id| *id != child);
            cancelled |= before != children.len();
            !children.is_empty()
        });
        cancelled
    }

    pub fn awaited_owner(&self, child: ItemId) -> Option<ItemId> {
        self.waiting
            .iter()
            .find(|(_, children)| children.contains(&child))
            .map(|(owner, _)| *owner)
    }

    /// Number of waiting children.
    pub fn len(&self) -> usize {
        self.waiting.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_child_waits_for_one_owner_only() {
        let mut pending = PendingAttachments::new();
        pending.wait(ItemId(10), ItemId(1));
        pending.wait(ItemId(11), ItemId(1));

        assert_eq!(pending.awaited_owner(ItemId(1)), Some(ItemId(11)));
        assert!(pending.take(ItemId(10)).is_empty());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn take_drains_in_arrival_order() {
        let mut pending = PendingAttachments::new();
        pending.wait(ItemId(10), ItemId(3));
        pending.wait(ItemId(10), ItemId(1));
        assert_eq!(pending.take(ItemId(10)), vec![ItemId(3), ItemId(1)]);
        assert!(pending.is_empty());
    }

    #[test]
    fn cancel_reports_whether_anything_was_waiting() {
        let mut pending = PendingAttachments::new();
        pending.wait(ItemId(10), ItemId(3));
        assert!(pending.cancel(ItemId(3)));
        assert!(!pending.cancel(ItemId(3)));
        assert!(pending.is_empty());
    }
}
