//! Card record and variant-group read model.
//!
//! # Invariants
//! - A variant (`variant_of_id = Some(root)`) references a root card that is
//!   not itself a variant and lives in the same container.
//! - `(variant_of_id, variant_order)` is unique among alive variants.
//! - `variant_order` is meaningless on root cards and kept at 0.

use super::container::ContainerId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable card identifier.
pub type CardId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub parent_id: ContainerId,
    pub name: String,
    pub description: String,
    /// Relative, normalized artwork path.
    pub art_path: Option<String>,
    pub sort_order: i64,
    /// Alive tag links, sorted. Read-only on the card document; links are
    /// written through the tag store.
    pub tag_ids: Vec<Uuid>,
    /// Mirror of the card's alive layout, maintained by layout writes.
    pub has_layout: bool,
    pub layout_version: Option<i64>,
    pub layout_updated_at: Option<i64>,
    pub variant_of_id: Option<CardId>,
    pub variant_order: i64,
    pub version: i64,
    pub updated_at: i64,
    pub is_deleted: bool,
}

impl Card {
    /// Builds an unsaved alive root card with a fresh id.
    pub fn new(parent_id: ContainerId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id,
            name: name.into(),
            description: String::new(),
            art_path: None,
            sort_order: 0,
            tag_ids: Vec::new(),
            has_layout: false,
            layout_version: None,
            layout_updated_at: None,
            variant_of_id: None,
            variant_order: 0,
            version: 0,
            updated_at: 0,
            is_deleted: false,
        }
    }

    /// Returns whether this card is a variant of another card.
    pub fn is_variant(&self) -> bool {
        self.variant_of_id.is_some()
    }
}

/// Root card followed by its alive variants in `(variant_order, id)` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantGroup {
    pub root: Card,
    pub variants: Vec<Card>,
}

impl VariantGroup {
    /// Root first, then variants.
    pub fn ids(&self) -> Vec<CardId> {
        std::iter::once(self.root.id)
            .chain(self.variants.iter().map(|card| card.id))
            .collect()
    }
}
