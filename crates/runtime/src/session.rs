//! High-level session orchestrator.
//!
//! The session owns the store worker and every observer replica, wires up
//! command/event channels, and exposes a builder-based API for clients.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use item_core::{DefinitionOracle, FragmentRegistry, StoreId};

use crate::api::{ObserverHandle, Result, RuntimeError, SessionHandle};
use crate::config::RuntimeConfig;
use crate::events::{Event, EventBus, Topic};
use crate::oracle::DefinitionCache;
use crate::workers::{ObserverReplica, StoreWorker};

/// Replica commands are queries; a small queue is enough.
const REPLICA_COMMAND_BUFFER: usize = 16;

/// Running session: one store worker plus its observer replicas.
///
/// [`SessionHandle`] and [`ObserverHandle`] provide cloneable façades for
/// clients; dropping them does not stop the session, [`Session::shutdown`] does.
pub struct Session {
    config: RuntimeConfig,
    handle: SessionHandle,
    event_bus: EventBus,
    definitions: Arc<dyn DefinitionOracle>,
    fragments: Arc<FragmentRegistry>,
    shutdown_tx: watch::Sender<bool>,
    store_worker: JoinHandle<()>,
    observers: Vec<ObserverHandle>,
    replica_workers: Vec<JoinHandle<()>>,
}

impl Session {
    /// Create a new session builder
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Start a session whose definitions come from `config.catalog_path`.
    pub async fn start(config: RuntimeConfig) -> Result<Self> {
        Self::builder().config(config).build().await
    }

    /// Get a cloneable handle to the authoritative stores
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Replicas in spawn order.
    pub fn observers(&self) -> &[ObserverHandle] {
        &self.observers
    }

    pub fn observer(&self, index: usize) -> Option<&ObserverHandle> {
        self.observers.get(index)
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.event_bus.subscribe(topic)
    }

    /// Spawn another replica of `store`.
    ///
    /// The replica starts from a snapshot, so it may join at any time.
    pub fn spawn_observer(&mut self, store: StoreId) -> Result<ObserverHandle> {
        if !self.config.store_ids().any(|id| id == store) {
            return Err(RuntimeError::UnknownStore { store });
        }

        let index = self.observers.len();
        let (command_tx, command_rx) = mpsc::channel(REPLICA_COMMAND_BUFFER);
        let (applied_tx, applied_rx) = watch::channel(0);

        let replica = ObserverReplica::new(
            index,
            store,
            &self.config,
            Arc::clone(&self.definitions),
            Arc::clone(&self.fragments),
            self.handle.clone(),
            &self.event_bus,
            command_rx,
            applied_tx,
            self.shutdown_tx.subscribe(),
        );
        self.replica_workers
            .push(tokio::spawn(async move { replica.run().await }));

        let observer = ObserverHandle::new(index, store, command_tx, applied_rx);
        self.observers.push(observer.clone());
        info!(replica = index, %store, "observer spawned");
        Ok(observer)
    }

    /// Shutdown the session gracefully
    pub async fn shutdown(self) -> Result<()> {
        // receivers only fail once every worker has already stopped
        let _ = self.shutdown_tx.send(true);

        self.store_worker.await.map_err(RuntimeError::WorkerJoin)?;
        for replica in self.replica_workers {
            replica.await.map_err(RuntimeError::WorkerJoin)?;
        }

        info!("session shut down");
        Ok(())
    }
}

/// Builder for [`Session`] with flexible configuration.
pub struct SessionBuilder {
    config: RuntimeConfig,
    definitions: Option<Arc<dyn DefinitionOracle>>,
    fragments: FragmentRegistry,
}

impl SessionBuilder {
    fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            definitions: None,
            fragments: FragmentRegistry::new(),
        }
    }

    /// Override session configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an already loaded definition source instead of `catalog_path`
    pub fn definitions(mut self, definitions: impl DefinitionOracle + 'static) -> Self {
        self.definitions = Some(Arc::new(definitions));
        self
    }

    /// Load definitions from a content data directory
    pub fn catalog(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.config.catalog_path = Some(data_dir.into());
        self
    }

    /// Fragment hooks shared by every store and replica
    pub fn fragments(mut self, fragments: FragmentRegistry) -> Self {
        self.fragments = fragments;
        self
    }

    /// Build the session and spawn its workers
    pub async fn build(self) -> Result<Session> {
        let definitions = match (self.definitions, &self.config.catalog_path) {
            (Some(definitions), _) => definitions,
            (None, Some(path)) => Arc::new(DefinitionCache::load(path)?) as Arc<dyn DefinitionOracle>,
            (None, None) => return Err(RuntimeError::MissingDefinitions),
        };
        let fragments = Arc::new(self.fragments);

        let (command_tx, command_rx) = mpsc::channel(self.config.command_buffer_size);
        let event_bus = EventBus::with_capacity(self.config.event_buffer_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = SessionHandle::new(command_tx, event_bus.clone());

        let worker = StoreWorker::new(
            &self.config,
            Arc::clone(&definitions),
            Arc::clone(&fragments),
            command_rx,
            event_bus.clone(),
            shutdown_rx,
        )?;
        let store_worker = tokio::spawn(async move { worker.run().await });

        let mut session = Session {
            config: self.config,
            handle,
            event_bus,
            definitions,
            fragments,
            shutdown_tx,
            store_worker,
            observers: Vec::new(),
            replica_workers: Vec::new(),
        };

        let primary = session.config.primary_store();
        for _ in 0..session.config.observers {
            session.spawn_observer(primary)?;
        }

        info!(
            stores = session.config.stores,
            observers = session.observers.len(),
            "session started"
        );
        Ok(session)
    }
}
