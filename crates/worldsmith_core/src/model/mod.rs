//! Domain model for the world content tree.
//!
//! # Responsibility
//! - Define canonical records for worlds, containers, cards, tags, card
//!   layouts and block templates.
//! - Provide name/path normalization shared by uniqueness checks and writes.
//!
//! # Invariants
//! - Every record carries `version`, `updated_at` (epoch ms) and `is_deleted`.
//! - Deletion is a soft tombstone until an explicit purge.

pub mod block_template;
pub mod card;
pub mod container;
pub mod cursor;
pub mod layout;
pub mod name;
pub mod tag;
pub mod world;

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Entity family used in errors, feed dispatch and trash items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    World,
    Container,
    Card,
    Tag,
    CardLayout,
    BlockTemplate,
}

impl EntityKind {
    /// Every kind, in dependency order (owners first).
    pub const ALL: [EntityKind; 6] = [
        EntityKind::World,
        EntityKind::Container,
        EntityKind::Card,
        EntityKind::Tag,
        EntityKind::CardLayout,
        EntityKind::BlockTemplate,
    ];

    /// Stable snake_case label, also used as persisted sync-cursor entity key.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::World => "world",
            Self::Container => "container",
            Self::Card => "card",
            Self::Tag => "tag",
            Self::CardLayout => "card_layout",
            Self::BlockTemplate => "block_template",
        }
    }

    /// Parses the label produced by [`EntityKind::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::EntityKind;

    #[test]
    fn entity_kind_labels_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("widget"), None);
    }
}
