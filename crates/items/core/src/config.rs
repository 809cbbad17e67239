/// Store-wide limits and behaviour switches.
///
/// Compile-time capacities live as associated constants so they can size
/// fixed buffers (`ArrayVec`) directly; runtime knobs are plain fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Deepest owner chain a new attachment may create.
    pub max_attachment_depth: usize,
    /// Audit and repair owner/attachment edges after every applied delta.
    pub audit_after_apply: bool,
    /// Upper 32 bits of every id generated by an authoritative store.
    pub id_session: u32,
}

impl StoreConfig {
    /// Maximum number of initial instance payloads an [`crate::ItemSpec`] may carry.
    pub const MAX_SPEC_INSTANCES: usize = 8;

    /// Default owner chain depth (item, part, sub-part, ...).
    pub const MAX_ATTACHMENT_DEPTH: usize = 8;

    pub const fn new() -> Self {
        Self {
            max_attachment_depth: Self::MAX_ATTACHMENT_DEPTH,
            audit_after_apply: true,
            id_session: 1,
        }
    }

    pub fn with_max_attachment_depth(mut self, depth: usize) -> Self {
        self.max_attachment_depth = depth.max(1);
        self
    }

    pub fn with_audit_after_apply(mut self, enabled: bool) -> Self {
        self.audit_after_apply = enabled;
        self
    }

    pub fn with_id_session(mut self, session: u32) -> Self {
        self.id_session = session;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_is_clamped_to_one() {
        let config = StoreConfig::default().with_max_attachment_depth(0);
        assert_eq!(config.max_attachment_depth, 1);
    }
}
