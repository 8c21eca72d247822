//! Container record: one node of a world's container tree.
//!
//! # Invariants
//! - `world_id` equals the world of the tree root and of every ancestor.
//! - `parent_id = None` marks a root container of its world.

use super::world::WorldId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable container identifier.
pub type ContainerId = Uuid;

/// What a container is meant to hold. Stored for clients, not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Cards,
    Containers,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cards => "cards",
            Self::Containers => "containers",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cards" => Some(Self::Cards),
            "containers" => Some(Self::Containers),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub world_id: WorldId,
    pub parent_id: Option<ContainerId>,
    pub name: String,
    pub description: String,
    pub content_type: ContentType,
    /// Sibling order key; listings sort by `(sort_order, id)`.
    pub sort_order: i64,
    pub version: i64,
    pub updated_at: i64,
    pub is_deleted: bool,
}
