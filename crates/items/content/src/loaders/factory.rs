//! Content factory for loading item data from one directory.

use std::path::{Path, PathBuf};

use anyhow::Context;
use item_core::{ItemDefinition, StaticDefinitions};

use crate::loaders::{CatalogLoader, LoadResult};

/// Content factory that loads item content from a data directory.
///
/// # Directory Structure
///
/// ```text
/// data_dir/
/// ├── items.ron
/// └── catalogs/
///     ├── attachments.ron
///     └── consumables.ron
/// ```
pub struct ContentFactory {
    data_dir: PathBuf,
}

impl ContentFactory {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Load the base catalog from `items.ron`.
    pub fn load_items(&self) -> LoadResult<Vec<ItemDefinition>> {
        CatalogLoader::load(&self.data_dir.join("items.ron"))
    }

    /// Load `items.ron` plus every catalog under `catalogs/`, validated together.
    pub fn load_all(&self) -> LoadResult<Vec<ItemDefinition>> {
        let mut items = CatalogLoader::parse(&self.data_dir.join("items.ron"))?;
        let extra = self.data_dir.join("catalogs");
        if extra.is_dir() {
            for file in CatalogLoader::ron_files(&extra)? {
                items.extend(CatalogLoader::parse(&file)?);
            }
        }
        CatalogLoader::check(&items)
            .with_context(|| format!("invalid content in {}", self.data_dir.display()))?;
        Ok(items)
    }

    /// In-memory definition table built from [`Self::load_all`].
    pub fn load_definitions(&self) -> LoadResult<StaticDefinitions> {
        Ok(self.load_all()?.into_iter().collect())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
