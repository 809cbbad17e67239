//! Data-driven item definitions and loaders.
//!
//! Item catalogs live in RON files and are turned into
//! [`item_core::ItemDefinition`]s here:
//! - Catalog validation (duplicate ids, dangling default occupants)
//! - Single-file and directory catalog loaders
//! - A content factory rooted at one data directory
//!
//! Content is consumed by the runtime's definition cache and never appears
//! in replicated item state.

pub mod validation;

#[cfg(feature = "loaders")]
pub mod loaders;

pub use validation::{CatalogIssue, validate};

#[cfg(feature = "loaders")]
pub use loaders::{CatalogLoader, ContentFactory, ItemCatalog, LoadResult};
