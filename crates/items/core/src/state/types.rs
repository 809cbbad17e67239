use core::fmt;

/// Globally unique identifier of one logical item.
///
/// Two instances with equal ids are the same item even when they live in
/// different stores (an observer's replica of an authoritative record).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemId(pub u64);

impl ItemId {
    /// Never assigned to an item.
    pub const INVALID: Self = Self(0);

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }

    /// Session half of the id (upper 32 bits).
    #[inline]
    pub const fn session(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out fresh ids for one authoritative session.
///
/// Ids are `(session << 32) | counter`; the counter starts at 1 and only
/// grows, so a generator never repeats a value. Once the counter is spent
/// the generator stays exhausted.
#[derive(Clone, Debug)]
pub struct ItemIdGenerator {
    session: u32,
    next: Option<u32>,
}

impl ItemIdGenerator {
    pub const fn new(session: u32) -> Self {
        Self {
            session,
            next: Some(1),
        }
    }

    pub const fn session(&self) -> u32 {
        self.session
    }

    /// `None` once every counter value of the session has been handed out.
    pub fn next_id(&mut self) -> Option<ItemId> {
        let counter = self.next?;
        self.next = counter.checked_add(1);
        Some(ItemId(((self.session as u64) << 32) | counter as u64))
    }

    /// Skips past an externally supplied id from the same session.
    pub fn observe(&mut self, id: ItemId) {
        if id.session() != self.session {
            return;
        }
        let counter = id.0 as u32;
        if let Some(next) = self.next
            && counter >= next
        {
            self.next = counter.checked_add(1);
        }
    }
}

/// Reference to an [`crate::ItemDefinition`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DefinitionId(pub u32);

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def:{}", self.0)
    }
}

/// Identifies one store (one collection) within a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StoreId(pub u32);

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store:{}", self.0)
    }
}

/// Named placement: an equip slot (`Head`) or a socket on an owner (`Barrel`).
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SlotTag(String);

impl SlotTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SlotTag {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for SlotTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Gameplay tag carried by definitions and added dynamically to instances.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ItemTag(String);

impl ItemTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemTag {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for ItemTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
