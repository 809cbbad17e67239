use crate::state::{ItemCollection, ItemId};

/// Disagreement between forward and back edges of the ownership graph.
///
/// Unresolvable ids are not violations: a child may legitimately reference
/// an owner that has not replicated yet, and vice versa.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GraphViolation {
    /// `child.owner == owner` but the owner does not list the child.
    MissingForwardEdge { owner: ItemId, child: ItemId },
    /// The owner lists `child`, whose owner field points elsewhere.
    StaleForwardEdge { owner: ItemId, child: ItemId },
    /// The item has an owner and a standalone slot at once.
    SlottedWhileAttached { item: ItemId },
}

pub fn audit(items: &ItemCollection) -> Vec<GraphViolation> {
    let mut violations = Vec::new();
    for item in items.iter() {
        if let Some(owner) = item.owner() {
            if item.slot().is_some() {
                violations.push(GraphViolation::SlottedWhileAttached { item: item.id() });
            }
            if let Some(owner_item) = items.get_item(owner)
                && !owner_item.attached_items().contains(&item.id())
            {
                violations.push(GraphViolation::MissingForwardEdge {
                    owner,
                    child: item.id(),
                });
            }
        }
        for child in item.attached_items() {
            if let Some(child_item) = items.get_item(*child)
                && child_item.owner() != Some(item.id())
            {
                violations.push(GraphViolation::StaleForwardEdge {
                    owner: item.id(),
                    child: *child,
                });
            }
        }
    }
    violations
}

/// Re-derives forward edges from each child's `owner` field.
///
/// Returns how many edges were changed. Slot conflicts are left alone since
/// both fields come from the authority.
pub fn repair(items: &mut ItemCollection, violations: &[GraphViolation]) -> usize {
    let mut repaired = 0;
    for violation in violations {
        let changed = match *violation {
            GraphViolation::MissingForwardEdge { owner, child } => items
                .get_item_mut(owner)
                .is_some_and(|item| item.link_child(child)),
            GraphViolation::StaleForwardEdge { owner, child } => items
                .get_item_mut(owner)
                .is_some_and(|item| item.unlink_child(child)),
            GraphViolation::SlottedWhileAttached { .. } => false,
        };
        if changed {
            repaired += 1;
        }
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ItemDefinition, StaticDefinitions};
    use crate::state::{DefinitionId, ItemSpec};

    #[test]
    fn repair_rederives_edges_from_owner_fields() {
        let defs = StaticDefinitions::new().with(ItemDefinition::new(DefinitionId(1), "part"));
        let mut items = ItemCollection::replica();
        for raw in 1..=3 {
            items.add_item(&ItemSpec::new(DefinitionId(1)), ItemId(raw), &defs);
        }
        // 2 claims owner 1 without a forward edge; 1 lists 3, which claims nobody
        items.get_item_mut(ItemId(2)).unwrap().owner = Some(ItemId(1));
        items.get_item_mut(ItemId(1)).unwrap().link_child(ItemId(3));
        // 3 also lists a child that has not arrived yet, which is fine
        items.get_item_mut(ItemId(3)).unwrap().link_child(ItemId(99));

        let violations = audit(&items);
        assert_eq!(
            violations,
            vec![
                GraphViolation::StaleForwardEdge {
                    owner: ItemId(1),
                    child: ItemId(3)
                },
                GraphViolation::MissingForwardEdge {
                    owner: ItemId(1),
                    child: ItemId(2)
                },
            ]
        );

        assert_eq!(repair(&mut items, &violations), 2);
        assert!(audit(&items).is_empty());
        assert_eq!(items.get_item(ItemId(1)).unwrap().attached_items(), &[ItemId(2)]);
    }
}
