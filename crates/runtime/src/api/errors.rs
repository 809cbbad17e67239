//! Unified error types surfaced by the session API.
//!
//! Wraps refusals from the stores, wire codec failures and worker
//! coordination problems so callers can bubble them up with one type.
use std::path::PathBuf;

use item_core::{CodecError, ErrorSeverity, ItemError, StoreError, StoreId};
use thiserror::Error;
use tokio::sync::oneshot;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("{store} is not hosted by this session")]
    UnknownStore { store: StoreId },

    #[error("cannot move an item from {store} into itself")]
    SameStoreMove { store: StoreId },

    #[error("store worker command channel closed")]
    CommandChannelClosed,

    #[error("store worker reply channel closed")]
    ReplyChannelClosed(#[source] oneshot::error::RecvError),

    #[error("observer replica {index} is no longer running")]
    ReplicaClosed { index: usize },

    #[error("worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),

    #[error("id session {session} leaves no room for {store}")]
    IdSessionOverflow { session: u32, store: StoreId },

    #[error("session requires item definitions before building")]
    MissingDefinitions,

    #[error("failed to load item catalog from {path}: {message}")]
    Catalog { path: PathBuf, message: String },
}

impl RuntimeError {
    /// Severity of the underlying failure, when it has one.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Store(error) => error.severity(),
            Self::Codec(error) => error.severity(),
            Self::UnknownStore { .. } | Self::SameStoreMove { .. } | Self::Catalog { .. } => {
                ErrorSeverity::Validation
            }
            Self::MissingDefinitions | Self::IdSessionOverflow { .. } => ErrorSeverity::Validation,
            Self::CommandChannelClosed
            | Self::ReplyChannelClosed(_)
            | Self::ReplicaClosed { .. }
            | Self::WorkerJoin(_) => ErrorSeverity::Fatal,
        }
    }
}
