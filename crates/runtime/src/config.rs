//! Session configuration structures and loaders.
use std::env;
use std::path::PathBuf;

use item_core::{StoreConfig, StoreId};

use crate::api::{Result, RuntimeError};

/// Low bits of an id session reserved for the store id.
const STORE_BITS: u32 = 8;

/// Configuration shared across the session orchestrator and workers.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub command_buffer_size: usize,
    pub event_buffer_size: usize,
    /// Authoritative stores hosted by the store worker, `StoreId(1)..=StoreId(n)`.
    pub stores: u32,
    /// Observer replicas spawned for the primary store at start.
    pub observers: usize,
    /// Data directory holding `items.ron` (and optionally `catalogs/`).
    pub catalog_path: Option<PathBuf>,
    /// Session half of every generated item id.
    pub session: u32,
    pub store: StoreConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,
            event_buffer_size: 256,
            stores: 2,
            observers: 1,
            catalog_path: None,
            session: 1,
            store: StoreConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `ITEMS_COMMAND_BUFFER` - Store worker queue size (default: 32)
    /// - `ITEMS_EVENT_CAPACITY` - Per-topic event capacity (default: 256)
    /// - `ITEMS_STORES` - Authoritative stores to host (default: 2)
    /// - `ITEMS_OBSERVERS` - Observer replicas of the primary store (default: 1)
    /// - `ITEMS_CATALOG` - Content data directory (default: none)
    /// - `ITEMS_SESSION` - Id session (default: 1)
    /// - `ITEMS_MAX_DEPTH` - Maximum attachment depth (default: 8)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(capacity) = read_env::<usize>("ITEMS_COMMAND_BUFFER") {
            config.command_buffer_size = capacity.max(1);
        }
        if let Some(capacity) = read_env::<usize>("ITEMS_EVENT_CAPACITY") {
            config.event_buffer_size = capacity.max(1);
        }
        if let Some(stores) = read_env::<u32>("ITEMS_STORES") {
            config.stores = stores.max(1);
        }
        if let Some(observers) = read_env::<usize>("ITEMS_OBSERVERS") {
            config.observers = observers;
        }
        config.catalog_path = env::var("ITEMS_CATALOG").ok().map(PathBuf::from);
        if let Some(session) = read_env::<u32>("ITEMS_SESSION") {
            config.session = session;
        }
        if let Some(depth) = read_env::<usize>("ITEMS_MAX_DEPTH") {
            config.store = config.store.with_max_attachment_depth(depth);
        }

        config
    }

    /// The store observers follow unless told otherwise.
    pub fn primary_store(&self) -> StoreId {
        StoreId(1)
    }

    pub fn store_ids(&self) -> impl Iterator<Item = StoreId> + '_ {
        (1..=self.stores.max(1)).map(StoreId)
    }

    /// Store settings for one hosted store.
    ///
    /// Each store draws ids from its own session, `session << 8 | store`, so
    /// items moved between stores never collide with ids generated by the
    /// target. Sessions above 24 bits and stores above 255 do not fit.
    pub fn store_config(&self, store: StoreId) -> Result<StoreConfig> {
        let id_session = self
            .session
            .checked_mul(1 << STORE_BITS)
            .filter(|_| store.0 < (1 << STORE_BITS))
            .map(|high| high | store.0)
            .ok_or(RuntimeError::IdSessionOverflow {
                session: self.session,
                store,
            })?;
        Ok(self.store.clone().with_id_session(id_session))
    }
}

fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok()?.parse().ok()
}
