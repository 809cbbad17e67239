//! Observer replica that mirrors one authoritative store.
//!
//! Follows [`Topic::Replication`], decodes every delta addressed to its
//! store and reconciles it into an [`ObserverStore`]. A replica that joins
//! late, lags behind the broadcast buffer or sees a sequence gap rebuilds
//! from a snapshot requested through the store worker.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use item_core::{
    DefinitionOracle, FragmentRegistry, ItemId, ItemRecord, LockTarget, ObserverStore,
    ReplicationDelta, ReplicationRecord, StoreId, StoreQuery, StructureDigest,
};

use crate::api::SessionHandle;
use crate::config::RuntimeConfig;
use crate::events::{Event, EventBus, Origin, ReplicationEvent, Topic};

/// Point-in-time summary of one replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaStatus {
    pub store: StoreId,
    /// Sequence of the last delta or snapshot applied.
    pub synced: u64,
    pub items: usize,
    /// Children still waiting for their owner.
    pub pending: usize,
    pub locks: usize,
    pub resyncs: u32,
}

/// Queries and lock requests served by a replica.
pub enum ReplicaCommand {
    Digest {
        reply: oneshot::Sender<StructureDigest>,
    },
    Item {
        id: ItemId,
        reply: oneshot::Sender<Option<ItemRecord>>,
    },
    Lock {
        target: LockTarget,
        reply: oneshot::Sender<bool>,
    },
    Unlock {
        target: LockTarget,
        reply: oneshot::Sender<bool>,
    },
    IsLocked {
        target: LockTarget,
        reply: oneshot::Sender<bool>,
    },
    Status {
        reply: oneshot::Sender<ReplicaStatus>,
    },
}

/// Background task owning one [`ObserverStore`].
pub struct ObserverReplica {
    index: usize,
    store: ObserverStore,
    session: SessionHandle,
    replication_rx: broadcast::Receiver<Event>,
    command_rx: mpsc::Receiver<ReplicaCommand>,
    applied: watch::Sender<u64>,
    shutdown: watch::Receiver<bool>,
    synced: u64,
    resyncs: u32,
}

impl ObserverReplica {
    /// Creates a replica of `store`.
    ///
    /// The replication subscription is taken here, before the task starts,
    /// so no delta published after this call can be missed.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: usize,
        store: StoreId,
        config: &RuntimeConfig,
        definitions: Arc<dyn DefinitionOracle>,
        fragments: Arc<FragmentRegistry>,
        session: SessionHandle,
        event_bus: &EventBus,
        command_rx: mpsc::Receiver<ReplicaCommand>,
        applied: watch::Sender<u64>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let mut observer =
            ObserverStore::new(store, definitions, fragments, config.store.clone());
        let bus = event_bus.clone();
        observer.listeners().on_any(move |event| {
            bus.publish(Event::Store {
                origin: Origin::Observer(index),
                event: event.clone(),
            })
        });

        Self {
            index,
            store: observer,
            session,
            replication_rx: event_bus.subscribe(Topic::Replication),
            command_rx,
            applied,
            shutdown,
            synced: 0,
            resyncs: 0,
        }
    }

    /// Main replica loop.
    pub async fn run(mut self) {
        self.resync().await;
        info!(replica = self.index, store = %self.store.store_id(), synced = self.synced, "ObserverReplica started");

        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    self.handle_command(cmd);
                }
                received = self.replication_rx.recv() => match received {
                    Ok(Event::Replication(event)) => self.handle_replication(event).await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!(replica = self.index, missed, "replication stream lagged, resyncing");
                        self.resync().await;
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = self.shutdown.changed() => break,
            }
        }
        info!(replica = self.index, "ObserverReplica stopped");
    }

    fn handle_command(&mut self, cmd: ReplicaCommand) {
        let delivered = match cmd {
            ReplicaCommand::Digest { reply } => reply.send(self.store.digest()).is_ok(),
            ReplicaCommand::Item { id, reply } => reply
                .send(self.store.get_item(id).map(ItemRecord::capture))
                .is_ok(),
            ReplicaCommand::Lock { target, reply } => reply.send(self.store.lock(target)).is_ok(),
            ReplicaCommand::Unlock { target, reply } => {
                reply.send(self.store.unlock(target)).is_ok()
            }
            ReplicaCommand::IsLocked { target, reply } => {
                reply.send(self.store.is_locked(&target)).is_ok()
            }
            ReplicaCommand::Status { reply } => reply.send(self.status()).is_ok(),
        };
        if !delivered {
            debug!(replica = self.index, "reply channel closed (caller dropped)");
        }
    }

    async fn handle_replication(&mut self, event: ReplicationEvent) {
        if event.store != self.store.store_id() {
            return;
        }
        if event.sequence <= self.synced {
            trace!(replica = self.index, sequence = event.sequence, "delta already covered");
            return;
        }
        if event.sequence > self.synced + 1 {
            warn!(
                replica = self.index,
                expected = self.synced + 1,
                received = event.sequence,
                "replication gap, resyncing"
            );
            return self.resync().await;
        }

        match ReplicationDelta::decode(&event.payload) {
            Ok(delta) => {
                let report = self.store.apply_delta(&delta);
                trace!(replica = self.index, sequence = delta.sequence, ?report, "delta applied");
                self.mark_synced(delta.sequence);
            }
            Err(err) => {
                warn!(replica = self.index, sequence = event.sequence, "{err}, resyncing");
                self.resync().await;
            }
        }
    }

    /// Rebuilds from a full snapshot of the authoritative store.
    ///
    /// Items the snapshot no longer lists are removed first.
    async fn resync(&mut self) {
        let snapshot = match self.session.snapshot(self.store.store_id()).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(replica = self.index, "snapshot unavailable: {err}");
                return;
            }
        };

        let live: HashSet<ItemId> = snapshot.records.iter().map(ReplicationRecord::id).collect();
        let mut records: Vec<ReplicationRecord> = self
            .store
            .core()
            .items()
            .ids()
            .into_iter()
            .filter(|id| !live.contains(id))
            .map(ReplicationRecord::Remove)
            .collect();
        records.extend(snapshot.records);

        let delta = ReplicationDelta {
            store: snapshot.store,
            sequence: snapshot.sequence,
            records,
        };
        let report = self.store.apply_delta(&delta);
        self.resyncs += 1;
        debug!(replica = self.index, sequence = delta.sequence, ?report, "resynced from snapshot");
        self.mark_synced(delta.sequence);
    }

    fn mark_synced(&mut self, sequence: u64) {
        self.synced = sequence;
        self.applied.send_replace(sequence);
    }

    fn status(&self) -> ReplicaStatus {
        ReplicaStatus {
            store: self.store.store_id(),
            synced: self.synced,
            items: self.store.len(),
            pending: self.store.pending().len(),
            locks: self.store.locks().len(),
            resyncs: self.resyncs,
        }
    }
}
