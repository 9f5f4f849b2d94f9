//! Boundary face tags and tag selectors.
//!
//! A tag only decides which boundary data a face reads; the planner
//! attaches no physics to it. Layout and flux code select faces through a
//! [`BoundarySelector`].

/// Tag carried by a boundary face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum BoundaryTag {
    #[default]
    Wall,
    Open,
    Inflow,
    Outflow,
    /// Application-defined tag.
    Custom(u32),
}

/// A subset of the boundary faces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoundarySelector {
    /// Every boundary face.
    All,
    Tag(BoundaryTag),
}

impl BoundarySelector {
    pub fn matches(&self, tag: BoundaryTag) -> bool {
        match *self {
            BoundarySelector::All => true,
            BoundarySelector::Tag(selected) => selected == tag,
        }
    }
}

impl From<BoundaryTag> for BoundarySelector {
    fn from(tag: BoundaryTag) -> Self {
        BoundarySelector::Tag(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_matches_every_tag() {
        for tag in [BoundaryTag::Wall, BoundaryTag::Outflow, BoundaryTag::Custom(9)] {
            assert!(BoundarySelector::All.matches(tag));
        }
    }

    #[test]
    fn test_tag_selector_is_exact() {
        let custom = BoundarySelector::from(BoundaryTag::Custom(1));
        assert!(custom.matches(BoundaryTag::Custom(1)));
        assert!(!custom.matches(BoundaryTag::Custom(2)));
        assert!(!BoundarySelector::from(BoundaryTag::Inflow).matches(BoundaryTag::Outflow));
    }
}
