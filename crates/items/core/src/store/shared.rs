use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::engine::audit::{self, GraphViolation};
use crate::engine::graph::GraphReducer;
use crate::engine::FragmentRegistry;
use crate::env::DefinitionOracle;
use crate::error::{ItemError, StoreError};
use crate::events::{EventListeners, StoreEvent};
use crate::state::{
    DefinitionId, ItemCollection, ItemId, ItemInstance, ItemTag, SlotTag, StoreId,
    StructureDigest,
};

/// State shared by both store roles.
pub struct StoreCore {
    pub(crate) id: StoreId,
    pub(crate) items: ItemCollection,
    pub(crate) definitions: Arc<dyn DefinitionOracle>,
    pub(crate) fragments: Arc<FragmentRegistry>,
    pub(crate) listeners: EventListeners,
    pub(crate) queued: Vec<StoreEvent>,
    pub(crate) config: StoreConfig,
}

impl StoreCore {
    pub(crate) fn new(
        id: StoreId,
        items: ItemCollection,
        definitions: Arc<dyn DefinitionOracle>,
        fragments: Arc<FragmentRegistry>,
        config: StoreConfig,
    ) -> Self {
        Self {
            id,
            items,
            definitions,
            fragments,
            listeners: EventListeners::new(),
            queued: Vec::new(),
            config,
        }
    }

    pub(crate) fn reducer(&mut self) -> GraphReducer<'_> {
        GraphReducer::new(&mut self.items, &self.fragments, &mut self.queued, self.id)
    }

    /// Hands every queued event to the listeners, in queue order.
    pub(crate) fn flush_events(&mut self) {
        let events = std::mem::take(&mut self.queued);
        for event in &events {
            self.listeners.dispatch(event);
        }
    }

    pub fn id(&self) -> StoreId {
        self.id
    }

    pub fn items(&self) -> &ItemCollection {
        &self.items
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

/// Logs a refused facade call and hands the error back.
///
/// Missing targets are expected while replication catches up and stay at
/// `debug`; policy violations are reported at `warn`.
pub(crate) fn refuse<T>(store: StoreId, error: StoreError) -> Result<T, StoreError> {
    if error.severity().is_recoverable() {
        debug!(%store, code = error.error_code(), "{error}");
    } else {
        warn!(%store, code = error.error_code(), "{error}");
    }
    Err(error)
}

/// Read-only queries answered by every store.
///
/// Lookups return `None` or empty results for unknown ids; that is a normal
/// outcome while replication is catching up.
pub trait StoreQuery {
    fn core(&self) -> &StoreCore;

    fn store_id(&self) -> StoreId {
        self.core().id
    }

    fn get_item(&self, id: ItemId) -> Option<&ItemInstance> {
        self.core().items.get_item(id)
    }

    fn contains(&self, id: ItemId) -> bool {
        self.core().items.contains(id)
    }

    fn len(&self) -> usize {
        self.core().items.len()
    }

    fn is_empty(&self) -> bool {
        self.core().items.is_empty()
    }

    /// Standalone item occupying `slot`.
    fn item_in_slot(&self, slot: &SlotTag) -> Option<&ItemInstance> {
        self.core()
            .items
            .iter()
            .find(|item| item.owner().is_none() && item.slot() == Some(slot))
    }

    fn items_on_slots(&self) -> Vec<&ItemInstance> {
        self.core()
            .items
            .items_where(|item| item.owner().is_none() && item.slot().is_some())
    }

    /// Resolvable children of `owner`, in attachment order.
    fn attached_items(&self, owner: ItemId) -> Vec<&ItemInstance> {
        let items = &self.core().items;
        items
            .get_item(owner)
            .map(|item| {
                item.attached_items()
                    .iter()
                    .filter_map(|child| items.get_item(*child))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn item_attached_at(&self, owner: ItemId, socket: &SlotTag) -> Option<&ItemInstance> {
        self.attached_items(owner)
            .into_iter()
            .find(|child| child.attached_to_slot() == Some(socket))
    }

    fn items_by_definition(&self, definition: DefinitionId) -> Vec<&ItemInstance> {
        self.core()
            .items
            .items_where(|item| item.definition_id() == definition)
    }

    /// Total stacks held across every item of `definition`.
    fn count_by_definition(&self, definition: DefinitionId) -> u32 {
        self.items_by_definition(definition)
            .iter()
            .map(|item| u32::from(item.stacks()))
            .sum()
    }

    fn item_with_tag(&self, tag: &ItemTag) -> Option<&ItemInstance> {
        self.core().items.iter().find(|item| item.has_tag(tag))
    }

    fn items_where<P>(&self, predicate: P) -> Vec<&ItemInstance>
    where
        P: FnMut(&ItemInstance) -> bool,
    {
        self.core().items.items_where(predicate)
    }

    fn digest(&self) -> StructureDigest {
        StructureDigest::of(&self.core().items)
    }

    fn audit(&self) -> Vec<GraphViolation> {
        audit::audit(&self.core().items)
    }
}
