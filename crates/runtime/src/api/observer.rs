//! Handle to one observer replica.
use tokio::sync::{mpsc, oneshot, watch};

use item_core::{ItemId, ItemRecord, LockTarget, SlotTag, StoreId, StructureDigest};

use super::errors::{Result, RuntimeError};
use crate::workers::{ReplicaCommand, ReplicaStatus};

#[derive(Clone)]
pub struct ObserverHandle {
    index: usize,
    store: StoreId,
    command_tx: mpsc::Sender<ReplicaCommand>,
    applied: watch::Receiver<u64>,
}

impl ObserverHandle {
    pub(crate) fn new(
        index: usize,
        store: StoreId,
        command_tx: mpsc::Sender<ReplicaCommand>,
        applied: watch::Receiver<u64>,
    ) -> Self {
        Self {
            index,
            store,
            command_tx,
            applied,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Store this replica mirrors.
    pub fn store(&self) -> StoreId {
        self.store
    }

    /// Last sequence the replica has applied.
    pub fn synced_sequence(&self) -> u64 {
        *self.applied.borrow()
    }

    /// Waits until the replica has applied `sequence` or anything later.
    pub async fn synced(&self, sequence: u64) -> Result<()> {
        let mut applied = self.applied.clone();
        applied
            .wait_for(|applied| *applied >= sequence)
            .await
            .map(|_| ())
            .map_err(|_| self.closed())
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ReplicaCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| self.closed())?;
        reply_rx.await.map_err(|_| self.closed())
    }

    fn closed(&self) -> RuntimeError {
        RuntimeError::ReplicaClosed { index: self.index }
    }

    pub async fn digest(&self) -> Result<StructureDigest> {
        self.request(|reply| ReplicaCommand::Digest { reply }).await
    }

    pub async fn item(&self, id: ItemId) -> Result<Option<ItemRecord>> {
        self.request(|reply| ReplicaCommand::Item { id, reply })
            .await
    }

    pub async fn status(&self) -> Result<ReplicaStatus> {
        self.request(|reply| ReplicaCommand::Status { reply }).await
    }

    /// Advisory lock; `true` when the target was not locked before.
    pub async fn lock(&self, target: LockTarget) -> Result<bool> {
        self.request(|reply| ReplicaCommand::Lock { target, reply })
            .await
    }

    pub async fn unlock(&self, target: LockTarget) -> Result<bool> {
        self.request(|reply| ReplicaCommand::Unlock { target, reply })
            .await
    }

    pub async fn is_locked(&self, target: LockTarget) -> Result<bool> {
        self.request(|reply| ReplicaCommand::IsLocked { target, reply })
            .await
    }

    pub async fn lock_item(&self, id: ItemId) -> Result<bool> {
        self.lock(LockTarget::Item(id)).await
    }

    pub async fn lock_slot(&self, slot: impl Into<SlotTag>) -> Result<bool> {
        self.lock(LockTarget::Slot(slot.into())).await
    }

    pub async fn lock_attachment_slot(
        &self,
        owner: ItemId,
        socket: impl Into<SlotTag>,
    ) -> Result<bool> {
        self.lock(LockTarget::AttachmentSlot {
            owner,
            socket: socket.into(),
        })
        .await
    }
}
