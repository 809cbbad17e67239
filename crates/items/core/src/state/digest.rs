use core::fmt;

use sha2::{Digest, Sha256};

use super::collection::ItemCollection;
use super::types::SlotTag;

/// SHA-256 over the replicated structure of a collection.
///
/// Items are hashed in id order with their forward edges sorted, so an
/// observer that converged through a different arrival order produces the
/// same digest as the authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StructureDigest(pub [u8; 32]);

impl StructureDigest {
    pub fn of(items: &ItemCollection) -> Self {
        let mut ordered: Vec<_> = items.iter().collect();
        ordered.sort_by_key(|item| item.id);

        let mut hasher = Sha256::new();
        for item in ordered {
            hasher.update(item.id.0.to_le_bytes());
            hasher.update(item.definition_id.0.to_le_bytes());
            hasher.update(item.owner.map_or(0, |id| id.0).to_le_bytes());
            hash_slot(&mut hasher, item.attached_to_slot.as_ref());
            hash_slot(&mut hasher, item.slot.as_ref());

            let mut children = item.attached_items.clone();
            children.sort();
            hasher.update((children.len() as u32).to_le_bytes());
            for child in children {
                hasher.update(child.0.to_le_bytes());
            }

            hasher.update([item.level]);
            hasher.update(item.stacks.to_le_bytes());
            hasher.update(item.version.to_le_bytes());
            for tag in &item.dynamic_tags {
                hasher.update(tag.as_str().as_bytes());
                hasher.update([0]);
            }
        }
        Self(hasher.finalize().into())
    }
}

fn hash_slot(hasher: &mut Sha256, slot: Option<&SlotTag>) {
    match slot {
        Some(tag) => {
            hasher.update([1]);
            hasher.update(tag.as_str().as_bytes());
            hasher.update([0]);
        }
        None => hasher.update([0]),
    }
}

impl fmt::Display for StructureDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ItemDefinition, StaticDefinitions};
    use crate::state::{DefinitionId, ItemId, ItemSpec};

    #[test]
    fn digest_ignores_storage_order_and_renders_as_hex() {
        let defs = StaticDefinitions::new().with(ItemDefinition::new(DefinitionId(1), "gem"));
        let spec = ItemSpec::new(DefinitionId(1));

        let mut forward = ItemCollection::new();
        forward.add_item(&spec, ItemId(1), &defs);
        forward.add_item(&spec, ItemId(2), &defs);

        let mut reverse = ItemCollection::new();
        reverse.add_item(&spec, ItemId(2), &defs);
        reverse.add_item(&spec, ItemId(1), &defs);

        let digest = StructureDigest::of(&forward);
        assert_eq!(digest, StructureDigest::of(&reverse));
        assert_eq!(digest.to_string(), hex::encode(digest.0));
        assert_ne!(digest, StructureDigest::of(&ItemCollection::new()));
    }
}
