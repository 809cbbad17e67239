//! Cloneable façade for issuing commands to the store worker.
//!
//! [`SessionHandle`] hides channel plumbing and offers async helpers for
//! every authoritative operation, plus topic subscriptions.
use std::collections::HashMap;

use tokio::sync::{broadcast, mpsc, oneshot};

use item_core::{
    Attachment, InstanceData, ItemId, ItemRecord, ItemSpec, ItemTag, RemoveAmount,
    ReplicationDelta, SlotTag, StoreId, StructureDigest,
};

use super::errors::{Result, RuntimeError};
use crate::events::{Event, EventBus, Topic};
use crate::workers::{Command, SlotCommand, TagCommand};

/// Client-facing handle to interact with the authoritative stores
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<Command>,
    event_bus: EventBus,
}

impl SessionHandle {
    pub(crate) fn new(command_tx: mpsc::Sender<Command>, event_bus: EventBus) -> Self {
        Self {
            command_tx,
            event_bus,
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)?
    }

    /// Create an item, optionally plugged into a socket of an existing one
    pub async fn add_item(
        &self,
        store: StoreId,
        spec: ItemSpec,
        attach: Option<Attachment>,
    ) -> Result<ItemId> {
        self.request(|reply| Command::AddItem {
            store,
            spec,
            attach,
            reply,
        })
        .await
    }

    /// Remove stacks or the whole item; `true` when the item left the store
    pub async fn remove_item(
        &self,
        store: StoreId,
        id: ItemId,
        amount: RemoveAmount,
        remove_on_zero: bool,
    ) -> Result<bool> {
        self.request(|reply| Command::RemoveItem {
            store,
            id,
            amount,
            remove_on_zero,
            reply,
        })
        .await
    }

    pub async fn attach_item(
        &self,
        store: StoreId,
        child: ItemId,
        owner: ItemId,
        socket: impl Into<SlotTag>,
    ) -> Result<()> {
        let socket = socket.into();
        self.request(|reply| Command::AttachItem {
            store,
            child,
            owner,
            socket,
            reply,
        })
        .await
    }

    pub async fn detach_item(&self, store: StoreId, child: ItemId) -> Result<bool> {
        self.request(|reply| Command::DetachItem {
            store,
            child,
            reply,
        })
        .await
    }

    pub async fn add_to_slot(
        &self,
        store: StoreId,
        id: ItemId,
        slot: impl Into<SlotTag>,
    ) -> Result<bool> {
        let op = SlotCommand::Add(slot.into());
        self.request(|reply| Command::Slot {
            store,
            id,
            op,
            reply,
        })
        .await
    }

    pub async fn remove_from_slot(&self, store: StoreId, id: ItemId) -> Result<bool> {
        self.request(|reply| Command::Slot {
            store,
            id,
            op: SlotCommand::Remove,
            reply,
        })
        .await
    }

    pub async fn change_slot(
        &self,
        store: StoreId,
        id: ItemId,
        slot: impl Into<SlotTag>,
    ) -> Result<bool> {
        let op = SlotCommand::Change(slot.into());
        self.request(|reply| Command::Slot {
            store,
            id,
            op,
            reply,
        })
        .await
    }

    pub async fn add_dynamic_tag(
        &self,
        store: StoreId,
        id: ItemId,
        tag: impl Into<ItemTag>,
    ) -> Result<bool> {
        let op = TagCommand::Add(tag.into());
        self.request(|reply| Command::Tag {
            store,
            id,
            op,
            reply,
        })
        .await
    }

    pub async fn remove_dynamic_tag(
        &self,
        store: StoreId,
        id: ItemId,
        tag: impl Into<ItemTag>,
    ) -> Result<bool> {
        let op = TagCommand::Remove(tag.into());
        self.request(|reply| Command::Tag {
            store,
            id,
            op,
            reply,
        })
        .await
    }

    pub async fn set_instance_data(
        &self,
        store: StoreId,
        id: ItemId,
        data: InstanceData,
    ) -> Result<bool> {
        self.request(|reply| Command::SetInstanceData {
            store,
            id,
            data,
            reply,
        })
        .await
    }

    pub async fn set_level(&self, store: StoreId, id: ItemId, level: u8) -> Result<bool> {
        self.request(|reply| Command::SetLevel {
            store,
            id,
            level,
            reply,
        })
        .await
    }

    /// Move an item and its attached subtree from one hosted store to another
    pub async fn move_item(&self, from: StoreId, to: StoreId, id: ItemId) -> Result<()> {
        self.request(|reply| Command::MoveItem {
            from,
            to,
            id,
            reply,
        })
        .await
    }

    /// Replicated fields of one item, if the store holds it
    pub async fn query_item(&self, store: StoreId, id: ItemId) -> Result<Option<ItemRecord>> {
        self.request(|reply| Command::QueryItem { store, id, reply })
            .await
    }

    /// Structure digest and the sequence of the last published delta
    pub async fn digest(&self, store: StoreId) -> Result<(StructureDigest, u64)> {
        self.request(|reply| Command::Digest { store, reply }).await
    }

    /// Full-state delta of one store
    pub async fn snapshot(&self, store: StoreId) -> Result<ReplicationDelta> {
        self.request(|reply| Command::Snapshot { store, reply }).await
    }

    /// Subscribe to events from a specific topic
    ///
    /// # Topics
    ///
    /// - `Topic::Items` - Item lifecycle events from authority and observers
    /// - `Topic::Replication` - Encoded deltas
    /// - `Topic::Locks` - Observer lock changes
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.event_bus.subscribe(topic)
    }

    /// Subscribe to multiple topics at once
    pub fn subscribe_multiple(&self, topics: &[Topic]) -> HashMap<Topic, broadcast::Receiver<Event>> {
        self.event_bus.subscribe_multiple(topics)
    }

    /// Get a reference to the event bus for advanced usage
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}
