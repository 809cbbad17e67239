use std::collections::HashMap;
use std::sync::Arc;

use crate::state::{DefinitionId, InstanceData, ItemTag, SlotTag};

/// Behaviour types a definition can declare.
///
/// Fragment hooks are registered per kind, see [`crate::FragmentRegistry`].
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FragmentKind {
    SocketSlots,
    Durability,
    Charges,
    GrantedTags,
}

/// Named socket on an owner item that one child may occupy.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SocketSlot {
    pub socket: SlotTag,
    /// Definition created and attached here when the owner is added.
    #[cfg_attr(feature = "serde", serde(default))]
    pub default_occupant: Option<DefinitionId>,
}

impl SocketSlot {
    pub fn new(socket: impl Into<SlotTag>) -> Self {
        Self {
            socket: socket.into(),
            default_occupant: None,
        }
    }

    pub fn with_default(mut self, definition: DefinitionId) -> Self {
        self.default_occupant = Some(definition);
        self
    }
}

/// Static behaviour declared by a definition.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Fragment {
    SocketSlots(Vec<SocketSlot>),
    Durability { max: u32 },
    Charges { initial: u16 },
    GrantedTags(Vec<ItemTag>),
}

impl Fragment {
    pub const fn kind(&self) -> FragmentKind {
        match self {
            Self::SocketSlots(_) => FragmentKind::SocketSlots,
            Self::Durability { .. } => FragmentKind::Durability,
            Self::Charges { .. } => FragmentKind::Charges,
            Self::GrantedTags(_) => FragmentKind::GrantedTags,
        }
    }

    fn sockets(&self) -> &[SocketSlot] {
        match self {
            Self::SocketSlots(slots) => slots,
            _ => &[],
        }
    }

    fn granted_tags(&self) -> &[ItemTag] {
        match self {
            Self::GrantedTags(tags) => tags,
            _ => &[],
        }
    }

    /// Instance payload this fragment seeds on every new item.
    pub fn initial_instance(&self) -> Option<InstanceData> {
        match self {
            Self::Durability { max } => Some(InstanceData::Durability {
                current: *max,
                max: *max,
            }),
            Self::Charges { initial } => Some(InstanceData::Charges(*initial)),
            Self::SocketSlots(_) | Self::GrantedTags(_) => None,
        }
    }
}

/// How repeated adds of one definition are folded into items.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StackMethod {
    /// Every add creates a separate item.
    #[default]
    CanNotStack,
    /// At most one item of the definition per store.
    Unique,
    /// Adds merge into an existing standalone item up to `max_stacks`.
    ByType { max_stacks: u16 },
}

/// Immutable, shared description of an item type.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemDefinition {
    pub id: DefinitionId,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub tags: Vec<ItemTag>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub fragments: Vec<Fragment>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub stack_method: StackMethod,
}

impl ItemDefinition {
    pub fn new(id: DefinitionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            tags: Vec::new(),
            fragments: Vec::new(),
            stack_method: StackMethod::default(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<ItemTag>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_fragment(mut self, fragment: Fragment) -> Self {
        self.fragments.push(fragment);
        self
    }

    pub fn with_stack_method(mut self, method: StackMethod) -> Self {
        self.stack_method = method;
        self
    }

    /// Fragment kinds in declaration order, used for hook dispatch.
    pub fn fragment_kinds(&self) -> impl Iterator<Item = FragmentKind> + '_ {
        self.fragments.iter().map(Fragment::kind)
    }

    pub fn socket_slots(&self) -> impl Iterator<Item = &SocketSlot> + '_ {
        self.fragments.iter().flat_map(Fragment::sockets)
    }

    pub fn has_sockets(&self) -> bool {
        self.socket_slots().next().is_some()
    }

    pub fn declares_socket(&self, socket: &SlotTag) -> bool {
        self.socket_slots().any(|slot| &slot.socket == socket)
    }

    /// Static tags plus every tag granted by a `GrantedTags` fragment.
    pub fn all_tags(&self) -> impl Iterator<Item = &ItemTag> + '_ {
        let granted = self.fragments.iter().flat_map(Fragment::granted_tags);
        self.tags.iter().chain(granted)
    }
}

/// Oracle providing item definitions.
///
/// Implementations are expected to cache: stores call this on every add and
/// on every replicated record they construct.
pub trait DefinitionOracle: Send + Sync {
    fn definition(&self, id: DefinitionId) -> Option<Arc<ItemDefinition>>;
}

/// In-memory definition table.
#[derive(Clone, Debug, Default)]
pub struct StaticDefinitions {
    definitions: HashMap<DefinitionId, Arc<ItemDefinition>>,
}

impl StaticDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, definition: ItemDefinition) {
        self.definitions.insert(definition.id, Arc::new(definition));
    }

    pub fn with(mut self, definition: ItemDefinition) -> Self {
        self.insert(definition);
        self
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl FromIterator<ItemDefinition> for StaticDefinitions {
    fn from_iter<I: IntoIterator<Item = ItemDefinition>>(iter: I) -> Self {
        let mut table = Self::new();
        for definition in iter {
            table.insert(definition);
        }
        table
    }
}

impl DefinitionOracle for StaticDefinitions {
    fn definition(&self, id: DefinitionId) -> Option<Arc<ItemDefinition>> {
        self.definitions.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rifle() -> ItemDefinition {
        ItemDefinition::new(DefinitionId(10), "rifle")
            .with_tag("weapon")
            .with_fragment(Fragment::SocketSlots(vec![
                SocketSlot::new("Barrel").with_default(DefinitionId(11)),
                SocketSlot::new("Scope"),
            ]))
            .with_fragment(Fragment::GrantedTags(vec![ItemTag::new("ranged")]))
            .with_fragment(Fragment::Durability { max: 100 })
    }

    #[test]
    fn sockets_are_collected_across_fragments() {
        let def = rifle();
        assert!(def.has_sockets());
        assert!(def.declares_socket(&SlotTag::new("Scope")));
        assert!(!def.declares_socket(&SlotTag::new("Stock")));
    }

    #[test]
    fn granted_tags_join_static_tags() {
        let def = rifle();
        let tags: Vec<_> = def.all_tags().map(ItemTag::as_str).collect();
        assert_eq!(tags, ["weapon", "ranged"]);
    }

    #[test]
    fn oracle_hands_out_shared_handles() {
        let table: StaticDefinitions = [rifle()].into_iter().collect();
        let a = table.definition(DefinitionId(10)).unwrap();
        let b = table.definition(DefinitionId(10)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(table.definition(DefinitionId(99)).is_none());
    }
}
