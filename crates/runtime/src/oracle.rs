//! Shared definition cache backing every store of a session.
//!
//! Definitions are immutable once loaded; stores and replicas hold the same
//! `Arc`s, so a lookup is a hash lookup plus a reference count bump.
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use item_content::ContentFactory;
use item_core::{DefinitionId, DefinitionOracle, ItemDefinition};

use crate::api::{Result, RuntimeError};

#[derive(Clone, Debug, Default)]
pub struct DefinitionCache {
    definitions: Arc<HashMap<DefinitionId, Arc<ItemDefinition>>>,
}

impl DefinitionCache {
    /// Builds the cache from already validated definitions.
    ///
    /// A later definition with the same id replaces an earlier one.
    pub fn from_definitions(definitions: impl IntoIterator<Item = ItemDefinition>) -> Self {
        let definitions = definitions
            .into_iter()
            .map(|definition| (definition.id, Arc::new(definition)))
            .collect();
        Self {
            definitions: Arc::new(definitions),
        }
    }

    /// Loads and validates every catalog under a content data directory.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let items = ContentFactory::new(data_dir)
            .load_all()
            .map_err(|err| RuntimeError::Catalog {
                path: data_dir.to_path_buf(),
                message: format!("{err:#}"),
            })?;
        tracing::info!(
            path = %data_dir.display(),
            definitions = items.len(),
            "item catalog loaded"
        );
        Ok(Self::from_definitions(items))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Loaded ids in ascending order.
    pub fn ids(&self) -> Vec<DefinitionId> {
        let mut ids: Vec<_> = self.definitions.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Looks a definition up by its catalog name.
    pub fn by_name(&self, name: &str) -> Option<Arc<ItemDefinition>> {
        self.definitions
            .values()
            .find(|definition| definition.name == name)
            .cloned()
    }
}

impl DefinitionOracle for DefinitionCache {
    fn definition(&self, id: DefinitionId) -> Option<Arc<ItemDefinition>> {
        let found = self.definitions.get(&id).cloned();
        if found.is_none() {
            tracing::debug!(definition = %id, "definition cache miss");
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_definitions() {
        let cache = DefinitionCache::from_definitions([
            ItemDefinition::new(DefinitionId(2), "scope"),
            ItemDefinition::new(DefinitionId(1), "rifle"),
        ]);
        let clone = cache.clone();

        let a = cache.definition(DefinitionId(1)).unwrap();
        let b = clone.definition(DefinitionId(1)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.ids(), vec![DefinitionId(1), DefinitionId(2)]);
        assert_eq!(cache.by_name("scope").unwrap().id, DefinitionId(2));
        assert!(cache.definition(DefinitionId(9)).is_none());
    }

    #[test]
    fn bundled_catalog_loads() {
        let data = Path::new(env!("CARGO_MANIFEST_DIR")).join("../items/content/data");
        let cache = DefinitionCache::load(&data).unwrap();
        assert!(cache.len() >= 8);
    }

    #[test]
    fn missing_catalog_reports_the_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = DefinitionCache::load(dir.path()).unwrap_err();
        assert!(matches!(err, RuntimeError::Catalog { .. }));
    }
}
