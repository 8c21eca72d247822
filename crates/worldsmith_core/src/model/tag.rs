//! Tag record. Tags are global and linked to cards many-to-many.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable tag identifier.
pub type TagId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    /// Uniqueness key among alive tags, see [`super::name::name_key`].
    pub normalized_name: String,
    /// Packed `0xAARRGGBB` colour.
    pub color_argb: u32,
    pub version: i64,
    pub updated_at: i64,
    pub is_deleted: bool,
}

/// Card filter semantics for tag-based listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMatch {
    /// Card carries at least one of the requested tags.
    Any,
    /// Card carries every requested tag.
    All,
}
