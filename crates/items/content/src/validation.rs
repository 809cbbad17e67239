//! Static checks over a set of item definitions.
//!
//! Stores tolerate most catalog mistakes at runtime (an unknown default
//! occupant is skipped, an unknown definition refuses the add), so these
//! checks exist to surface them at load time instead.

use std::collections::{HashMap, HashSet};
use std::fmt;

use item_core::{DefinitionId, ItemDefinition, SlotTag, StackMethod};

/// One problem found in a catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogIssue {
    DuplicateId {
        id: DefinitionId,
        first: String,
        second: String,
    },
    DuplicateSocket {
        definition: DefinitionId,
        socket: SlotTag,
    },
    UnknownDefaultOccupant {
        definition: DefinitionId,
        socket: SlotTag,
        occupant: DefinitionId,
    },
    /// Default occupants that eventually contain their own owner.
    DefaultOccupantCycle { definition: DefinitionId },
    ZeroStackLimit { definition: DefinitionId },
}

impl fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateId { id, first, second } => {
                write!(f, "{id} is declared by both '{first}' and '{second}'")
            }
            Self::DuplicateSocket { definition, socket } => {
                write!(f, "{definition} declares socket {socket} twice")
            }
            Self::UnknownDefaultOccupant {
                definition,
                socket,
                occupant,
            } => write!(
                f,
                "{definition} socket {socket} defaults to {occupant}, which is not in the catalog"
            ),
            Self::DefaultOccupantCycle { definition } => {
                write!(f, "default occupants of {definition} loop back to itself")
            }
            Self::ZeroStackLimit { definition } => {
                write!(f, "{definition} stacks by type with a limit of zero")
            }
        }
    }
}

/// Returns every issue found, in catalog order.
pub fn validate(definitions: &[ItemDefinition]) -> Vec<CatalogIssue> {
    let mut issues = Vec::new();
    let mut names: HashMap<DefinitionId, &str> = HashMap::new();

    for definition in definitions {
        if let Some(first) = names.insert(definition.id, &definition.name) {
            issues.push(CatalogIssue::DuplicateId {
                id: definition.id,
                first: first.to_string(),
                second: definition.name.clone(),
            });
        }

        let mut sockets = HashSet::new();
        for slot in definition.socket_slots() {
            if !sockets.insert(&slot.socket) {
                issues.push(CatalogIssue::DuplicateSocket {
                    definition: definition.id,
                    socket: slot.socket.clone(),
                });
            }
        }

        if let StackMethod::ByType { max_stacks: 0 } = definition.stack_method {
            issues.push(CatalogIssue::ZeroStackLimit {
                definition: definition.id,
            });
        }
    }

    // first declaration wins
    let mut by_id: HashMap<DefinitionId, &ItemDefinition> = HashMap::new();
    for definition in definitions {
        by_id.entry(definition.id).or_insert(definition);
    }
    for definition in definitions {
        for slot in definition.socket_slots() {
            if let Some(occupant) = slot.default_occupant
                && !by_id.contains_key(&occupant)
            {
                issues.push(CatalogIssue::UnknownDefaultOccupant {
                    definition: definition.id,
                    socket: slot.socket.clone(),
                    occupant,
                });
            }
        }
        if reaches(&by_id, definition.id, definition.id) {
            issues.push(CatalogIssue::DefaultOccupantCycle {
                definition: definition.id,
            });
        }
    }
    issues
}

/// Whether following default occupants from `from` leads back to `target`.
fn reaches(
    by_id: &HashMap<DefinitionId, &ItemDefinition>,
    from: DefinitionId,
    target: DefinitionId,
) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![from];
    while let Some(current) = stack.pop() {
        let Some(definition) = by_id.get(&current) else {
            continue;
        };
        for occupant in definition
            .socket_slots()
            .filter_map(|slot| slot.default_occupant)
        {
            if occupant == target {
                return true;
            }
            if visited.insert(occupant) {
                stack.push(occupant);
            }
        }
    }
    false
}
