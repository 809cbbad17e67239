//! Item catalog loader.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use item_core::ItemDefinition;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::loaders::{LoadResult, read_file};
use crate::validation::validate;

/// Item catalog structure for RON files.
///
/// ```ron
/// (
///     items: [
///         (
///             id: DefinitionId(1),
///             name: "rifle",
///             tags: ["weapon"],
///             fragments: [SocketSlots([(socket: "Optic", default_occupant: Some(DefinitionId(2)))])],
///         ),
///         (id: DefinitionId(2), name: "scope"),
///     ],
/// )
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemCatalog {
    pub items: Vec<ItemDefinition>,
}

/// Loader for item catalogs from RON files.
pub struct CatalogLoader;

impl CatalogLoader {
    /// Parses one catalog file without validating it.
    pub fn parse(path: &Path) -> LoadResult<Vec<ItemDefinition>> {
        let content = read_file(path)?;
        let catalog: ItemCatalog = ron::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse item catalog RON {}: {}", path.display(), e)
        })?;
        debug!(path = %path.display(), definitions = catalog.items.len(), "catalog parsed");
        Ok(catalog.items)
    }

    /// Loads and validates one catalog file.
    pub fn load(path: &Path) -> LoadResult<Vec<ItemDefinition>> {
        let items = Self::parse(path)?;
        Self::check(&items).with_context(|| format!("invalid catalog {}", path.display()))?;
        Ok(items)
    }

    /// Loads every `*.ron` catalog in `dir`, in file name order, and
    /// validates the merged result.
    pub fn load_dir(dir: &Path) -> LoadResult<Vec<ItemDefinition>> {
        let mut items = Vec::new();
        for file in Self::ron_files(dir)? {
            items.extend(Self::parse(&file)?);
        }
        Self::check(&items).with_context(|| format!("invalid catalogs in {}", dir.display()))?;
        Ok(items)
    }

    pub(crate) fn ron_files(dir: &Path) -> LoadResult<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read catalog directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "ron"))
            .collect();
        files.sort();
        Ok(files)
    }

    pub(crate) fn check(items: &[ItemDefinition]) -> LoadResult<()> {
        let issues = validate(items);
        if issues.is_empty() {
            return Ok(());
        }
        for issue in &issues {
            warn!(%issue, "catalog issue");
        }
        let summary: Vec<String> = issues.iter().map(ToString::to_string).collect();
        bail!("{} catalog issue(s): {}", issues.len(), summary.join("; "))
    }
}
