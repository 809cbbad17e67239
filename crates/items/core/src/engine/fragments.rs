use std::collections::HashMap;
use std::sync::Arc;

use crate::env::FragmentKind;
use crate::state::{ItemId, ItemInstance, SlotTag};

/// Notification delivered to fragment hooks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FragmentEvent {
    Added,
    Changed,
    PreRemove,
    AddedToSlot { slot: SlotTag },
    RemovedFromSlot { slot: SlotTag },
    ChangedSlot { new: SlotTag, old: SlotTag },
    AttachedTo { owner: ItemId },
    DetachedFrom { owner: ItemId },
}

/// Behaviour attached to a fragment kind.
///
/// Every method defaults to a no-op so a hook only implements what it
/// reacts to. Hooks observe; they never mutate the store that calls them.
pub trait FragmentHook: Send + Sync {
    fn on_item_added(&self, _item: &ItemInstance) {}

    fn on_item_changed(&self, _item: &ItemInstance) {}

    fn on_pre_remove(&self, _item: &ItemInstance) {}

    fn on_added_to_slot(&self, _item: &ItemInstance, _slot: &SlotTag) {}

    fn on_removed_from_slot(&self, _item: &ItemInstance, _slot: &SlotTag) {}

    fn on_changed_slot(&self, _item: &ItemInstance, _new: &SlotTag, _old: &SlotTag) {}

    fn on_attached_to(&self, _item: &ItemInstance, _owner: ItemId) {}

    fn on_detached_from(&self, _item: &ItemInstance, _owner: ItemId) {}
}

/// Hook table built once and shared by every store of a session.
#[derive(Clone, Default)]
pub struct FragmentRegistry {
    global: Vec<Arc<dyn FragmentHook>>,
    by_kind: HashMap<FragmentKind, Vec<Arc<dyn FragmentHook>>>,
}

impl FragmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook invoked for items whose definition declares `kind`.
    pub fn register(&mut self, kind: FragmentKind, hook: Arc<dyn FragmentHook>) {
        self.by_kind.entry(kind).or_default().push(hook);
    }

    /// Hook invoked for every item regardless of its fragments.
    pub fn register_global(&mut self, hook: Arc<dyn FragmentHook>) {
        self.global.push(hook);
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.by_kind.is_empty()
    }

    /// Global hooks first, then kind hooks in definition declaration order.
    pub fn dispatch(&self, item: &ItemInstance, event: &FragmentEvent) {
        for hook in &self.global {
            deliver(hook.as_ref(), item, event);
        }
        let Some(definition) = item.definition() else {
            return;
        };
        for kind in definition.fragment_kinds() {
            if let Some(hooks) = self.by_kind.get(&kind) {
                for hook in hooks {
                    deliver(hook.as_ref(), item, event);
                }
            }
        }
    }
}

impl core::fmt::Debug for FragmentRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FragmentRegistry")
            .field("global", &self.global.len())
            .field("kinds", &self.by_kind.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn deliver(hook: &dyn FragmentHook, item: &ItemInstance, event: &FragmentEvent) {
    match event {
        FragmentEvent::Added => hook.on_item_added(item),
        FragmentEvent::Changed => hook.on_item_changed(item),
        FragmentEvent::PreRemove => hook.on_pre_remove(item),
        FragmentEvent::AddedToSlot { slot } => hook.on_added_to_slot(item, slot),
        FragmentEvent::RemovedFromSlot { slot } => hook.on_removed_from_slot(item, slot),
        FragmentEvent::ChangedSlot { new, old } => hook.on_changed_slot(item, new, old),
        FragmentEvent::AttachedTo { owner } => hook.on_attached_to(item, *owner),
        FragmentEvent::DetachedFrom { owner } => hook.on_detached_from(item, *owner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Fragment, ItemDefinition};
    use crate::state::{DefinitionId, ItemSpec};
    use std::sync::Mutex;

    struct Tally {
        label: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl FragmentHook for Tally {
        fn on_item_added(&self, item: &ItemInstance) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:added:{}", self.label, item.id()));
        }

        fn on_added_to_slot(&self, _item: &ItemInstance, slot: &SlotTag) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:slot:{}", self.label, slot));
        }
    }

    #[test]
    fn global_hooks_run_before_kind_hooks_in_declaration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let tally = |label| {
            Arc::new(Tally {
                label,
                seen: Arc::clone(&seen),
            })
        };

        let mut registry = FragmentRegistry::new();
        registry.register(FragmentKind::Charges, tally("charges"));
        registry.register(FragmentKind::Durability, tally("durability"));
        registry.register(FragmentKind::SocketSlots, tally("sockets"));
        registry.register_global(tally("global"));

        let definition = Arc::new(
            ItemDefinition::new(DefinitionId(1), "lamp")
                .with_fragment(Fragment::Durability { max: 5 })
                .with_fragment(Fragment::Charges { initial: 3 }),
        );
        let item = ItemInstance::from_spec(ItemId(8), &ItemSpec::new(DefinitionId(1)), definition);

        registry.dispatch(&item, &FragmentEvent::Added);
        registry.dispatch(
            &item,
            &FragmentEvent::AddedToSlot {
                slot: SlotTag::new("Belt"),
            },
        );

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "global:added:#8",
                "durability:added:#8",
                "charges:added:#8",
                "global:slot:Belt",
                "durability:slot:Belt",
                "charges:slot:Belt",
            ]
        );
    }
}
