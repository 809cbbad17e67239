//! Read-only collaborators consumed by the stores.
//!
//! Definitions are static content shared by every item that references
//! them; stores only ever hold `Arc` handles obtained from a
//! [`DefinitionOracle`].
mod definitions;

pub use definitions::{
    DefinitionOracle, Fragment, FragmentKind, ItemDefinition, SocketSlot, StackMethod,
    StaticDefinitions,
};
