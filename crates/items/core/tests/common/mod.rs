#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use item_core::{
    ApplyReport, AuthoritativeStore, DefinitionId, Fragment, FragmentEvent, FragmentHook,
    FragmentRegistry, ItemDefinition, ItemId, ItemInstance, ObserverStore, SlotTag, SocketSlot,
    StackMethod, StaticDefinitions, StoreConfig, StoreId,
};

pub const STORE: StoreId = StoreId(7);

pub const RIFLE: DefinitionId = DefinitionId(1);
pub const SCOPE: DefinitionId = DefinitionId(2);
pub const BARREL: DefinitionId = DefinitionId(3);
pub const HELMET: DefinitionId = DefinitionId(4);
pub const AMMO: DefinitionId = DefinitionId(5);
pub const SUPPRESSOR: DefinitionId = DefinitionId(6);

pub fn definitions() -> Arc<StaticDefinitions> {
    Arc::new(
        StaticDefinitions::new()
            .with(
                ItemDefinition::new(RIFLE, "rifle")
                    .with_tag("weapon")
                    .with_fragment(Fragment::SocketSlots(vec![
                        SocketSlot::new("Optic").with_default(SCOPE),
                        SocketSlot::new("Barrel"),
                        SocketSlot::new("Stock"),
                    ])),
            )
            .with(ItemDefinition::new(SCOPE, "scope").with_tag("optic"))
            .with(
                ItemDefinition::new(BARREL, "barrel")
                    .with_tag("barrel")
                    .with_fragment(Fragment::SocketSlots(vec![SocketSlot::new("Muzzle")])),
            )
            .with(
                ItemDefinition::new(HELMET, "helmet")
                    .with_tag("armor")
                    .with_fragment(Fragment::Durability { max: 60 }),
            )
            .with(
                ItemDefinition::new(AMMO, "ammo")
                    .with_stack_method(StackMethod::ByType { max_stacks: 50 }),
            )
            .with(ItemDefinition::new(SUPPRESSOR, "suppressor").with_tag("quiet")),
    )
}

/// Fragment hook that remembers every notification it receives.
#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<(ItemId, FragmentEvent)>>,
    added: Mutex<Vec<AddedView>>,
}

/// Links an item had when its `Added` notification arrived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddedView {
    pub id: ItemId,
    pub children: usize,
    pub owner: Option<ItemId>,
}

impl Recorder {
    fn push(&self, item: &ItemInstance, event: FragmentEvent) {
        self.seen.lock().unwrap().push((item.id(), event));
    }

    pub fn events(&self) -> Vec<(ItemId, FragmentEvent)> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self, id: ItemId, event: &FragmentEvent) -> usize {
        self.events()
            .iter()
            .filter(|(item, seen)| *item == id && seen == event)
            .count()
    }

    pub fn position(&self, id: ItemId, event: &FragmentEvent) -> Option<usize> {
        self.events()
            .iter()
            .position(|(item, seen)| *item == id && seen == event)
    }

    pub fn added(&self, id: ItemId) -> Option<AddedView> {
        self.added
            .lock()
            .unwrap()
            .iter()
            .find(|view| view.id == id)
            .cloned()
    }

    pub fn clear(&self) {
        self.seen.lock().unwrap().clear();
        self.added.lock().unwrap().clear();
    }
}

impl FragmentHook for Recorder {
    fn on_item_added(&self, item: &ItemInstance) {
        self.added.lock().unwrap().push(AddedView {
            id: item.id(),
            children: item.attached_items().len(),
            owner: item.owner(),
        });
        self.push(item, FragmentEvent::Added);
    }

    fn on_item_changed(&self, item: &ItemInstance) {
        self.push(item, FragmentEvent::Changed);
    }

    fn on_pre_remove(&self, item: &ItemInstance) {
        self.push(item, FragmentEvent::PreRemove);
    }

    fn on_added_to_slot(&self, item: &ItemInstance, slot: &SlotTag) {
        self.push(item, FragmentEvent::AddedToSlot { slot: slot.clone() });
    }

    fn on_removed_from_slot(&self, item: &ItemInstance, slot: &SlotTag) {
        self.push(item, FragmentEvent::RemovedFromSlot { slot: slot.clone() });
    }

    fn on_changed_slot(&self, item: &ItemInstance, new: &SlotTag, old: &SlotTag) {
        self.push(
            item,
            FragmentEvent::ChangedSlot {
                new: new.clone(),
                old: old.clone(),
            },
        );
    }

    fn on_attached_to(&self, item: &ItemInstance, owner: ItemId) {
        self.push(item, FragmentEvent::AttachedTo { owner });
    }

    fn on_detached_from(&self, item: &ItemInstance, owner: ItemId) {
        self.push(item, FragmentEvent::DetachedFrom { owner });
    }
}

fn registry(recorder: &Arc<Recorder>) -> Arc<FragmentRegistry> {
    let mut registry = FragmentRegistry::new();
    registry.register_global(recorder.clone());
    Arc::new(registry)
}

pub fn authority() -> (AuthoritativeStore, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let store = AuthoritativeStore::new(
        STORE,
        definitions(),
        registry(&recorder),
        StoreConfig::default(),
    );
    (store, recorder)
}

pub fn observer() -> (ObserverStore, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let store = ObserverStore::new(
        STORE,
        definitions(),
        registry(&recorder),
        StoreConfig::default(),
    );
    (store, recorder)
}

/// Ships everything the authority changed since the last call.
pub fn replicate(authority: &mut AuthoritativeStore, observer: &mut ObserverStore) -> ApplyReport {
    match authority.collect_delta() {
        Some(delta) => observer.apply_delta(&delta),
        None => ApplyReport::default(),
    }
}
