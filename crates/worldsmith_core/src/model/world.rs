//! World record: root of a forest of containers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable world identifier.
pub type WorldId = Uuid;

/// Top-level authoring universe. Names are unique among alive worlds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct World {
    pub id: WorldId,
    pub name: String,
    pub description: String,
    /// Monotonic write counter, 0 on creation.
    pub version: i64,
    /// Epoch ms of the last write, including soft-delete and restore.
    pub updated_at: i64,
    pub is_deleted: bool,
}

impl World {
    /// Builds an unsaved alive world with a fresh id.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            version: 0,
            updated_at: 0,
            is_deleted: false,
        }
    }
}
