use arrayvec::ArrayVec;

use super::types::{DefinitionId, ItemId};
use crate::config::StoreConfig;
use crate::error::SpecError;

/// Key of a per-instance mutable payload.
///
/// An item holds at most one payload per kind.
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
pub enum InstanceKind {
    Durability,
    RolledStats,
    Charges,
    Custom,
}

/// Per-instance mutable payload ("instanced data").
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstanceData {
    Durability { current: u32, max: u32 },
    /// Randomized stat rolls, e.g. `("damage", 12)`.
    RolledStats(Vec<(String, i32)>),
    Charges(u16),
    Custom { key: String, bytes: Vec<u8> },
}

impl InstanceData {
    pub const fn kind(&self) -> InstanceKind {
        match self {
            Self::Durability { .. } => InstanceKind::Durability,
            Self::RolledStats(_) => InstanceKind::RolledStats,
            Self::Charges(_) => InstanceKind::Charges,
            Self::Custom { .. } => InstanceKind::Custom,
        }
    }
}

/// Immutable creation template for one item.
///
/// A spec is consumed exactly once by a store to construct an instance.
/// `id` may be left [`ItemId::INVALID`] to let the store generate one.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemSpec {
    pub id: ItemId,
    pub definition: DefinitionId,
    pub level: u8,
    pub amount: u16,
    fragment_instances: ArrayVec<InstanceData, { StoreConfig::MAX_SPEC_INSTANCES }>,
}

impl ItemSpec {
    pub fn new(definition: DefinitionId) -> Self {
        Self {
            id: ItemId::INVALID,
            definition,
            level: 1,
            amount: 1,
            fragment_instances: ArrayVec::new(),
        }
    }

    pub fn with_id(mut self, id: ItemId) -> Self {
        self.id = id;
        self
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    pub fn with_amount(mut self, amount: u16) -> Self {
        self.amount = amount.max(1);
        self
    }

    /// Appends an initial instance payload.
    pub fn with_instance(mut self, data: InstanceData) -> Result<Self, SpecError> {
        self.push_instance(data)?;
        Ok(self)
    }

    pub fn push_instance(&mut self, data: InstanceData) -> Result<(), SpecError> {
        self.fragment_instances
            .try_push(data)
            .map_err(|_| SpecError::TooManyInstances {
                max: StoreConfig::MAX_SPEC_INSTANCES,
            })
    }

    pub fn fragment_instances(&self) -> &[InstanceData] {
        &self.fragment_instances
    }
}
