use bitflags::bitflags;

bitflags! {
    /// Tracks which replicated fields of an item differ between a local
    /// instance and an incoming [`super::ItemRecord`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ItemFields: u16 {
        const DEFINITION     = 1 << 0;
        const OWNER          = 1 << 1;
        const ATTACH_SLOT    = 1 << 2;
        const ATTACHED_ITEMS = 1 << 3;
        const SLOT           = 1 << 4;
        const LEVEL          = 1 << 5;
        const STACKS         = 1 << 6;
        const DYNAMIC_TAGS   = 1 << 7;
        const INSTANCES      = 1 << 8;
    }
}

impl ItemFields {
    /// Fields that change the owner/attachment graph.
    pub const LINKS: Self = Self::OWNER.union(Self::ATTACH_SLOT);
}
