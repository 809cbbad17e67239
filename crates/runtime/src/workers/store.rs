//! Store worker that owns every [`item_core::AuthoritativeStore`] of a session.
//!
//! Receives commands from [`crate::SessionHandle`], applies them to the
//! addressed store, and after each command drains the store's changes into a
//! bincode-encoded delta published on [`Topic::Replication`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace};

use item_core::{
    Attachment, AuthoritativeStore, DefinitionOracle, FragmentRegistry, InstanceData, ItemId,
    ItemRecord, ItemSpec, ItemTag, RemoveAmount, ReplicationDelta, SlotTag, StoreId, StoreQuery,
    StructureDigest,
};

use crate::api::{Result, RuntimeError};
use crate::config::RuntimeConfig;
use crate::events::{Event, EventBus, Origin, ReplicationEvent};

/// Slot operations forwarded to a store.
#[derive(Debug, Clone)]
pub enum SlotCommand {
    Add(SlotTag),
    Remove,
    Change(SlotTag),
}

/// Dynamic tag operations forwarded to a store.
#[derive(Debug, Clone)]
pub enum TagCommand {
    Add(ItemTag),
    Remove(ItemTag),
}

/// Commands that can be sent to the store worker
pub enum Command {
    AddItem {
        store: StoreId,
        spec: ItemSpec,
        attach: Option<Attachment>,
        reply: oneshot::Sender<Result<ItemId>>,
    },
    RemoveItem {
        store: StoreId,
        id: ItemId,
        amount: RemoveAmount,
        remove_on_zero: bool,
        reply: oneshot::Sender<Result<bool>>,
    },
    AttachItem {
        store: StoreId,
        child: ItemId,
        owner: ItemId,
        socket: SlotTag,
        reply: oneshot::Sender<Result<()>>,
    },
    DetachItem {
        store: StoreId,
        child: ItemId,
        reply: oneshot::Sender<Result<bool>>,
    },
    Slot {
        store: StoreId,
        id: ItemId,
        op: SlotCommand,
        reply: oneshot::Sender<Result<bool>>,
    },
    Tag {
        store: StoreId,
        id: ItemId,
        op: TagCommand,
        reply: oneshot::Sender<Result<bool>>,
    },
    SetInstanceData {
        store: StoreId,
        id: ItemId,
        data: InstanceData,
        reply: oneshot::Sender<Result<bool>>,
    },
    SetLevel {
        store: StoreId,
        id: ItemId,
        level: u8,
        reply: oneshot::Sender<Result<bool>>,
    },
    /// Move a subtree between two hosted stores.
    MoveItem {
        from: StoreId,
        to: StoreId,
        id: ItemId,
        reply: oneshot::Sender<Result<()>>,
    },
    QueryItem {
        store: StoreId,
        id: ItemId,
        reply: oneshot::Sender<Result<Option<ItemRecord>>>,
    },
    /// Current digest and the sequence of the last published delta.
    Digest {
        store: StoreId,
        reply: oneshot::Sender<Result<(StructureDigest, u64)>>,
    },
    /// Full-state delta for a replica joining late or resyncing.
    Snapshot {
        store: StoreId,
        reply: oneshot::Sender<Result<ReplicationDelta>>,
    },
}

impl Command {
    fn stores(&self) -> (StoreId, Option<StoreId>) {
        match self {
            Command::MoveItem { from, to, .. } => (*from, Some(*to)),
            Command::AddItem { store, .. }
            | Command::RemoveItem { store, .. }
            | Command::AttachItem { store, .. }
            | Command::DetachItem { store, .. }
            | Command::Slot { store, .. }
            | Command::Tag { store, .. }
            | Command::SetInstanceData { store, .. }
            | Command::SetLevel { store, .. }
            | Command::QueryItem { store, .. }
            | Command::Digest { store, .. }
            | Command::Snapshot { store, .. } => (*store, None),
        }
    }
}

/// Background task that serializes every mutation of the hosted stores.
///
/// Moves between stores take both stores mutably inside this one task, so
/// no other command can observe a half-moved subtree.
pub struct StoreWorker {
    stores: BTreeMap<StoreId, AuthoritativeStore>,
    command_rx: mpsc::Receiver<Command>,
    event_bus: EventBus,
    shutdown: watch::Receiver<bool>,
}

impl StoreWorker {
    /// Creates a worker hosting one authoritative store per configured id.
    pub fn new(
        config: &RuntimeConfig,
        definitions: Arc<dyn DefinitionOracle>,
        fragments: Arc<FragmentRegistry>,
        command_rx: mpsc::Receiver<Command>,
        event_bus: EventBus,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let stores = config
            .store_ids()
            .map(|id| -> Result<(StoreId, AuthoritativeStore)> {
                let mut store = AuthoritativeStore::new(
                    id,
                    Arc::clone(&definitions),
                    Arc::clone(&fragments),
                    config.store_config(id)?,
                );
                let bus = event_bus.clone();
                store.listeners().on_any(move |event| {
                    bus.publish(Event::Store {
                        origin: Origin::Authority,
                        event: event.clone(),
                    })
                });
                Ok((id, store))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        info!(stores = stores.len(), "StoreWorker initialized");

        Ok(Self {
            stores,
            command_rx,
            event_bus,
            shutdown,
        })
    }

    /// Main worker loop.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    self.handle_command(cmd);
                }
                _ = self.shutdown.changed() => break,
                else => break,
            }
        }
        info!("StoreWorker stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        let (store, other) = cmd.stores();
        match cmd {
            Command::AddItem {
                store,
                spec,
                attach,
                reply,
            } => {
                let result = self
                    .store_mut(store)
                    .and_then(|s| Ok(s.add_item(&spec, attach)?));
                respond(reply, result, "AddItem");
            }
            Command::RemoveItem {
                store,
                id,
                amount,
                remove_on_zero,
                reply,
            } => {
                let result = self
                    .store_mut(store)
                    .and_then(|s| Ok(s.remove_item(id, amount, remove_on_zero)?));
                respond(reply, result, "RemoveItem");
            }
            Command::AttachItem {
                store,
                child,
                owner,
                socket,
                reply,
            } => {
                let result = self
                    .store_mut(store)
                    .and_then(|s| Ok(s.attach_item(child, owner, socket)?));
                respond(reply, result, "AttachItem");
            }
            Command::DetachItem {
                store,
                child,
                reply,
            } => {
                let result = self
                    .store_mut(store)
                    .and_then(|s| Ok(s.detach_item(child)?));
                respond(reply, result, "DetachItem");
            }
            Command::Slot {
                store,
                id,
                op,
                reply,
            } => {
                let result = self.store_mut(store).and_then(|s| {
                    Ok(match op {
                        SlotCommand::Add(slot) => s.add_to_slot(id, slot)?,
                        SlotCommand::Remove => s.remove_from_slot(id)?,
                        SlotCommand::Change(slot) => s.change_slot(id, slot)?,
                    })
                });
                respond(reply, result, "Slot");
            }
            Command::Tag {
                store,
                id,
                op,
                reply,
            } => {
                let result = self.store_mut(store).and_then(|s| {
                    Ok(match op {
                        TagCommand::Add(tag) => s.add_dynamic_tag(id, tag)?,
                        TagCommand::Remove(tag) => s.remove_dynamic_tag(id, &tag)?,
                    })
                });
                respond(reply, result, "Tag");
            }
            Command::SetInstanceData {
                store,
                id,
                data,
                reply,
            } => {
                let result = self
                    .store_mut(store)
                    .and_then(|s| Ok(s.set_instance_data(id, data)?));
                respond(reply, result, "SetInstanceData");
            }
            Command::SetLevel {
                store,
                id,
                level,
                reply,
            } => {
                let result = self
                    .store_mut(store)
                    .and_then(|s| Ok(s.set_level(id, level)?));
                respond(reply, result, "SetLevel");
            }
            Command::MoveItem {
                from,
                to,
                id,
                reply,
            } => {
                let result = self.move_item(from, to, id);
                respond(reply, result, "MoveItem");
            }
            Command::QueryItem { store, id, reply } => {
                let result = self
                    .store(store)
                    .map(|s| s.get_item(id).map(ItemRecord::capture));
                respond(reply, result, "QueryItem");
            }
            Command::Digest { store, reply } => {
                let result = self.store(store).map(|s| (s.digest(), s.sequence()));
                respond(reply, result, "Digest");
            }
            Command::Snapshot { store, reply } => {
                let result = self.store(store).map(AuthoritativeStore::snapshot);
                respond(reply, result, "Snapshot");
            }
        }

        self.publish_delta(store);
        if let Some(other) = other {
            self.publish_delta(other);
        }
    }

    fn move_item(&mut self, from: StoreId, to: StoreId, id: ItemId) -> Result<()> {
        if from == to {
            return Err(RuntimeError::SameStoreMove { store: from });
        }
        if !self.stores.contains_key(&from) {
            return Err(RuntimeError::UnknownStore { store: from });
        }
        let mut target = self
            .stores
            .remove(&to)
            .ok_or(RuntimeError::UnknownStore { store: to })?;
        let result = match self.stores.get_mut(&from) {
            Some(source) => target.move_item_from(id, source).map_err(RuntimeError::from),
            None => Err(RuntimeError::UnknownStore { store: from }),
        };
        self.stores.insert(to, target);
        result
    }

    /// Drains one store's changes and publishes them, if there are any.
    fn publish_delta(&mut self, store: StoreId) {
        let Some(delta) = self.stores.get_mut(&store).and_then(|s| s.collect_delta()) else {
            return;
        };
        match delta.encode() {
            Ok(bytes) => {
                trace!(%store, sequence = delta.sequence, bytes = bytes.len(), "delta published");
                self.event_bus.publish(Event::Replication(ReplicationEvent {
                    store,
                    sequence: delta.sequence,
                    records: delta.len(),
                    payload: bytes.into(),
                }));
            }
            Err(err) => {
                // observers will resync from a snapshot once they notice the gap
                tracing::error!(%store, sequence = delta.sequence, "failed to encode delta: {err}");
            }
        }
    }

    fn store(&self, id: StoreId) -> Result<&AuthoritativeStore> {
        self.stores
            .get(&id)
            .ok_or(RuntimeError::UnknownStore { store: id })
    }

    fn store_mut(&mut self, id: StoreId) -> Result<&mut AuthoritativeStore> {
        self.stores
            .get_mut(&id)
            .ok_or(RuntimeError::UnknownStore { store: id })
    }
}

fn respond<T>(reply: oneshot::Sender<Result<T>>, result: Result<T>, command: &str) {
    if reply.send(result).is_err() {
        debug!("{command} reply channel closed (caller dropped)");
    }
}
