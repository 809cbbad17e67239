//! Payloads carried by the event bus.
use std::fmt;
use std::sync::Arc;

use item_core::StoreId;

/// Which side of the session raised a store event.
///
/// Observers mirror the store id of the authority they follow, so the id
/// alone does not tell the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Authority,
    /// Observer replica, by spawn index.
    Observer(usize),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Authority => write!(f, "authority"),
            Origin::Observer(index) => write!(f, "observer-{index}"),
        }
    }
}

/// One bincode-encoded [`item_core::ReplicationDelta`].
#[derive(Debug, Clone)]
pub struct ReplicationEvent {
    pub store: StoreId,
    pub sequence: u64,
    pub records: usize,
    pub payload: Arc<[u8]>,
}
