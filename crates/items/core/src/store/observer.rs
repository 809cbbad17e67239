use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use super::locks::LockSet;
use super::shared::{StoreCore, StoreQuery};
use crate::config::StoreConfig;
use crate::engine::graph::GraphReducer;
use crate::engine::{FragmentEvent, FragmentRegistry, PendingAttachments, audit};
use crate::env::DefinitionOracle;
use crate::events::{EventListeners, ItemChange, LockTarget, StoreEvent};
use crate::state::{
    ItemCollection, ItemFields, ItemId, ItemRecord, ReplicationDelta, ReplicationRecord, SlotTag,
    StoreId,
};

/// Outcome of one [`ObserverStore::apply_delta`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
    /// Stale, duplicate or unknown records that changed nothing.
    pub skipped: usize,
    /// Children still waiting for their owner after the delta.
    pub pending: usize,
    /// Graph edges repaired by the post-apply audit.
    pub repaired: usize,
}

impl ApplyReport {
    pub fn applied(&self) -> usize {
        self.added + self.changed + self.removed
    }
}

/// Store role that mirrors an authoritative store from its deltas.
///
/// Records may arrive in any order relative to the items they reference.
/// A child whose owner is not present yet keeps its replicated `owner` field
/// and waits in [`PendingAttachments`] until that owner is inserted.
pub struct ObserverStore {
    core: StoreCore,
    pending: PendingAttachments,
    locks: LockSet,
    last_sequence: Option<u64>,
}

impl ObserverStore {
    pub fn new(
        id: StoreId,
        definitions: Arc<dyn DefinitionOracle>,
        fragments: Arc<FragmentRegistry>,
        config: StoreConfig,
    ) -> Self {
        Self {
            core: StoreCore::new(id, ItemCollection::replica(), definitions, fragments, config),
            pending: PendingAttachments::new(),
            locks: LockSet::new(),
            last_sequence: None,
        }
    }

    pub fn listeners(&mut self) -> &mut EventListeners {
        &mut self.core.listeners
    }

    pub fn pending(&self) -> &PendingAttachments {
        &self.pending
    }

    pub fn locks(&self) -> &LockSet {
        &self.locks
    }

    /// Sequence of the last delta applied.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Applies every record of `delta` in order, then audits the graph.
    pub fn apply_delta(&mut self, delta: &ReplicationDelta) -> ApplyReport {
        let mut report = ApplyReport::default();
        if delta.store != self.core.id {
            warn!(
                store = %self.core.id,
                delta_store = %delta.store,
                "delta addressed to another store ignored"
            );
            report.skipped = delta.len();
            return report;
        }

        for record in &delta.records {
            match record {
                ReplicationRecord::Add(record) => self.apply_add(record, &mut report),
                ReplicationRecord::Change(record) => self.apply_change(record, &mut report),
                ReplicationRecord::Remove(id) => self.apply_remove(*id, &mut report),
            }
        }

        if self.core.config.audit_after_apply {
            let violations = audit::audit(&self.core.items);
            if !violations.is_empty() {
                error!(
                    store = %self.core.id,
                    sequence = delta.sequence,
                    ?violations,
                    "graph inconsistent after delta, re-deriving forward edges"
                );
                report.repaired = audit::repair(&mut self.core.items, &violations);
            }
        }

        report.pending = self.pending.len();
        self.last_sequence = Some(delta.sequence);
        self.core.flush_events();
        trace!(store = %self.core.id, sequence = delta.sequence, ?report, "delta applied");
        report
    }

    fn apply_add(&mut self, record: &ItemRecord, report: &mut ApplyReport) {
        let id = record.id;
        if self.core.items.contains(id) {
            return self.apply_change(record, report);
        }

        let definition = self.core.definitions.definition(record.definition);
        if definition.is_none() {
            debug!(item = %id, definition = %record.definition, "replicated item references an unloaded definition");
        }
        if self.core.items.insert(record.to_instance(definition)).is_none() {
            debug!(item = %id, "replicated record with an invalid id ignored");
            report.skipped += 1;
            return;
        }
        self.confirm_locks(record);
        report.added += 1;

        let mut graph = self.core.reducer();
        merge_forward_edges(&mut graph, id, &record.attached_items);
        if let Some(owner) = record.owner {
            link_owner(&mut graph, &mut self.pending, id, owner, &record.attached_to_slot);
        }
        graph.refresh_tags(id);
        graph.notify(id, FragmentEvent::Added);
        graph.emit(id, ItemChange::Added);
        if record.owner.is_none()
            && let Some(slot) = record.slot.clone()
        {
            graph.announce_slot_added(id, slot);
        }

        for child in self.pending.take(id) {
            let socket = graph
                .items
                .get_item(child)
                .filter(|item| item.owner() == Some(id))
                .map(|item| item.attached_to_slot().cloned().unwrap_or_default());
            if let Some(socket) = socket {
                trace!(item = %child, owner = %id, "owner arrived, attaching");
                graph.attach(child, id, socket);
                graph.changed(child);
                graph.changed(id);
            }
        }
    }

    fn apply_change(&mut self, record: &ItemRecord, report: &mut ApplyReport) {
        let id = record.id;
        let Some(local) = self.core.items.get_item(id) else {
            return self.apply_add(record, report);
        };
        if record.version <= local.version() {
            trace!(item = %id, version = record.version, "stale or duplicate record skipped");
            report.skipped += 1;
            return;
        }

        let fields = record.changed_fields(local);
        let previous_owner = local.owner();
        let previous_slot = local.slot().cloned();
        let definition = fields
            .contains(ItemFields::DEFINITION)
            .then(|| self.core.definitions.definition(record.definition));
        self.confirm_locks(record);

        let mut graph = self.core.reducer();
        let relinked = fields.intersects(ItemFields::LINKS);
        if relinked && let Some(previous) = previous_owner {
            if !self.pending.cancel(id) {
                graph.detach_from(id, previous);
                if graph.items.contains(previous) {
                    graph.changed(previous);
                }
            }
        }
        let standalone = record.owner.is_none();
        if fields.contains(ItemFields::SLOT)
            && record.slot.is_none()
            && let Some(slot) = previous_slot.clone()
        {
            graph.announce_slot_removed(id, slot);
        }

        if let Some(item) = graph.items.get_item_mut(id) {
            record.write_fields(item);
            if let Some(definition) = definition {
                item.set_definition(definition);
            }
        }
        graph.changed(id);

        if fields.contains(ItemFields::SLOT) && standalone {
            match (previous_slot, record.slot.clone()) {
                (Some(old), Some(new)) => graph.announce_slot_changed(id, new, old),
                (None, Some(new)) => graph.announce_slot_added(id, new),
                _ => {}
            }
        }
        if relinked && let Some(owner) = record.owner {
            link_owner(&mut graph, &mut self.pending, id, owner, &record.attached_to_slot);
        }
        if fields.contains(ItemFields::ATTACHED_ITEMS) {
            merge_forward_edges(&mut graph, id, &record.attached_items);
        }
        graph.refresh_tags(id);
        report.changed += 1;
    }

    fn apply_remove(&mut self, id: ItemId, report: &mut ApplyReport) {
        self.pending.cancel(id);
        let Some(item) = self.core.items.get_item(id) else {
            trace!(item = %id, "remove for unknown item skipped");
            report.skipped += 1;
            return;
        };

        let mut targets = vec![LockTarget::Item(id)];
        targets.extend(item.slot().cloned().map(LockTarget::Slot));
        if let (Some(owner), Some(socket)) = (item.owner(), item.attached_to_slot().cloned()) {
            targets.push(LockTarget::AttachmentSlot { owner, socket });
        }
        for target in targets {
            self.release_lock(target);
        }

        self.core.reducer().release(id);
        report.removed += 1;
    }

    /// Replication is the authoritative confirmation of any request in flight
    /// for the record's item, its slots and its sockets.
    fn confirm_locks(&mut self, record: &ItemRecord) {
        let mut targets = vec![LockTarget::Item(record.id)];
        for slot in [&record.slot, &record.old_slot].into_iter().flatten() {
            targets.push(LockTarget::Slot(slot.clone()));
        }
        for (owner, socket) in [
            (record.owner, &record.attached_to_slot),
            (record.old_owner, &record.old_attached_to_slot),
        ] {
            if let (Some(owner), Some(socket)) = (owner, socket) {
                targets.push(LockTarget::AttachmentSlot {
                    owner,
                    socket: socket.clone(),
                });
            }
        }
        for target in targets {
            self.release_lock(target);
        }
    }

    fn release_lock(&mut self, target: LockTarget) {
        if self.locks.unlock(&target) {
            trace!(store = %self.core.id, ?target, "lock confirmed by replication");
            self.core.queued.push(StoreEvent::LockChanged {
                store: self.core.id,
                target,
                locked: false,
            });
        }
    }

    /// Marks `target` busy until replication confirms it. `false` when it
    /// was already locked.
    pub fn lock(&mut self, target: LockTarget) -> bool {
        let taken = self.locks.lock(&target);
        if taken {
            self.core.queued.push(StoreEvent::LockChanged {
                store: self.core.id,
                target,
                locked: true,
            });
            self.core.flush_events();
        }
        taken
    }

    pub fn unlock(&mut self, target: LockTarget) -> bool {
        let released = self.locks.unlock(&target);
        if released {
            self.core.queued.push(StoreEvent::LockChanged {
                store: self.core.id,
                target,
                locked: false,
            });
            self.core.flush_events();
        }
        released
    }

    pub fn is_locked(&self, target: &LockTarget) -> bool {
        self.locks.is_locked(target)
    }

    pub fn lock_item(&mut self, id: ItemId) -> bool {
        self.lock(LockTarget::Item(id))
    }

    pub fn unlock_item(&mut self, id: ItemId) -> bool {
        self.unlock(LockTarget::Item(id))
    }

    pub fn is_item_locked(&self, id: ItemId) -> bool {
        self.is_locked(&LockTarget::Item(id))
    }

    pub fn lock_slot(&mut self, slot: impl Into<SlotTag>) -> bool {
        self.lock(LockTarget::Slot(slot.into()))
    }

    pub fn unlock_slot(&mut self, slot: impl Into<SlotTag>) -> bool {
        self.unlock(LockTarget::Slot(slot.into()))
    }

    pub fn is_slot_locked(&self, slot: &SlotTag) -> bool {
        self.is_locked(&LockTarget::Slot(slot.clone()))
    }

    pub fn lock_attachment_slot(&mut self, owner: ItemId, socket: impl Into<SlotTag>) -> bool {
        self.lock(LockTarget::AttachmentSlot {
            owner,
            socket: socket.into(),
        })
    }

    pub fn unlock_attachment_slot(&mut self, owner: ItemId, socket: impl Into<SlotTag>) -> bool {
        self.unlock(LockTarget::AttachmentSlot {
            owner,
            socket: socket.into(),
        })
    }

    pub fn is_attachment_slot_locked(&self, owner: ItemId, socket: &SlotTag) -> bool {
        self.is_locked(&LockTarget::AttachmentSlot {
            owner,
            socket: socket.clone(),
        })
    }
}

impl StoreQuery for ObserverStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }
}

/// Attaches `child` to `owner` now, or parks it until `owner` arrives.
fn link_owner(
    graph: &mut GraphReducer<'_>,
    pending: &mut PendingAttachments,
    child: ItemId,
    owner: ItemId,
    socket: &Option<SlotTag>,
) {
    if graph.items.contains(owner) {
        graph.attach(child, owner, socket.clone().unwrap_or_default());
        graph.changed(owner);
    } else {
        trace!(item = %child, %owner, "owner not replicated yet, waiting");
        pending.wait(owner, child);
    }
}

/// Rebuilds the forward edges of `owner` from its replicated list.
///
/// Listed children that are present locally but claim another owner are
/// dropped; local children claiming `owner` that the list misses are kept.
/// Absent children stay listed until their own record arrives.
fn merge_forward_edges(graph: &mut GraphReducer<'_>, owner: ItemId, listed: &[ItemId]) {
    let items = &*graph.items;
    let mut edges: Vec<ItemId> = Vec::with_capacity(listed.len());
    let claimed = listed.iter().copied().filter(|child| {
        items
            .get_item(*child)
            .is_none_or(|item| item.owner() == Some(owner))
    });
    let local = items
        .items_where(|item| item.owner() == Some(owner))
        .into_iter()
        .map(|item| item.id());
    for child in claimed.chain(local) {
        if !edges.contains(&child) {
            edges.push(child);
        }
    }
    if let Some(item) = graph.items.get_item_mut(owner) {
        item.attached_items = edges;
    }
}
