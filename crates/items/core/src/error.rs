//! Common error infrastructure for item-core.
//!
//! Lookups never fail: an unknown id, slot or definition is a normal `None`.
//! Errors are reserved for facade calls that were refused, either because
//! the request broke a store policy or because a referenced item is missing.
//!
//! # Severity
//!
//! - **Recoverable**: the referenced item or definition is not present (yet)
//! - **Validation**: the request violates a store policy and was ignored
//! - **Internal**: storage or graph bookkeeping disagrees with itself
//! - **Fatal**: reserved for hosts that cannot continue after an error

use crate::state::{DefinitionId, ItemId, SlotTag};

/// Severity level of an error, used for categorization and logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// The target is absent; retrying after replication catches up may succeed.
    Recoverable,

    /// Invalid request, should not retry without changes.
    ///
    /// Examples: slotting an attached item, id collision on move
    Validation,

    /// Unexpected state inconsistency.
    ///
    /// Examples: index map drift, forward/back edge mismatch
    Internal,

    /// Unrecoverable, the store must be rebuilt.
    Fatal,
}

impl ErrorSeverity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Recoverable => "recoverable",
            Self::Validation => "validation",
            Self::Internal => "internal",
            Self::Fatal => "fatal",
        }
    }

    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable)
    }

    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal | Self::Fatal)
    }
}

/// Common interface for every error type raised by item-core.
pub trait ItemError: core::fmt::Display {
    fn severity(&self) -> ErrorSeverity;

    /// Stable machine-readable code, e.g. `"STORE_ITEM_ATTACHED"`.
    fn error_code(&self) -> &'static str;
}

/// Refusals raised by the store facades.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("item {id} not found")]
    ItemNotFound { id: ItemId },

    #[error("definition {definition} is not loaded")]
    UnknownDefinition { definition: DefinitionId },

    #[error("item {id} already exists in this store")]
    DuplicateItem { id: ItemId },

    #[error("item {id} is attached to {owner} and cannot be slotted")]
    ItemAttached { id: ItemId, owner: ItemId },

    #[error("item {id} occupies slot {slot} and cannot be attached")]
    ItemSlotted { id: ItemId, slot: SlotTag },

    #[error("owner {owner} declares no socket {socket}")]
    UnknownSocket { owner: ItemId, socket: SlotTag },

    #[error("socket {socket} on {owner} is occupied by {occupant}")]
    SocketOccupied {
        owner: ItemId,
        socket: SlotTag,
        occupant: ItemId,
    },

    #[error("attaching {child} to {owner} would create a cycle")]
    AttachmentCycle { owner: ItemId, child: ItemId },

    #[error("attaching to {owner} exceeds the maximum depth of {max}")]
    AttachmentTooDeep { owner: ItemId, max: usize },

    #[error("definition {definition} is unique and already present")]
    UniqueItemExists { definition: DefinitionId, existing: ItemId },

    #[error("id session {session} has handed out every id")]
    IdsExhausted { session: u32 },
}

impl ItemError for StoreError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ItemNotFound { .. } | Self::UnknownDefinition { .. } => {
                ErrorSeverity::Recoverable
            }
            Self::IdsExhausted { .. } => ErrorSeverity::Fatal,
            _ => ErrorSeverity::Validation,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::ItemNotFound { .. } => "STORE_ITEM_NOT_FOUND",
            Self::UnknownDefinition { .. } => "STORE_UNKNOWN_DEFINITION",
            Self::DuplicateItem { .. } => "STORE_DUPLICATE_ITEM",
            Self::ItemAttached { .. } => "STORE_ITEM_ATTACHED",
            Self::ItemSlotted { .. } => "STORE_ITEM_SLOTTED",
            Self::UnknownSocket { .. } => "STORE_UNKNOWN_SOCKET",
            Self::SocketOccupied { .. } => "STORE_SOCKET_OCCUPIED",
            Self::AttachmentCycle { .. } => "STORE_ATTACHMENT_CYCLE",
            Self::AttachmentTooDeep { .. } => "STORE_ATTACHMENT_TOO_DEEP",
            Self::UniqueItemExists { .. } => "STORE_UNIQUE_ITEM_EXISTS",
            Self::IdsExhausted { .. } => "STORE_IDS_EXHAUSTED",
        }
    }
}

/// Errors raised while building an [`crate::ItemSpec`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("spec already carries the maximum of {max} instance payloads")]
    TooManyInstances { max: usize },
}

impl ItemError for SpecError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::TooManyInstances { .. } => "SPEC_TOO_MANY_INSTANCES",
        }
    }
}
