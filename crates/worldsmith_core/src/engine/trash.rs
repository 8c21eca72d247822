//! Soft-deleted containers and cards of one world, newest first.

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::model::world::WorldId;
use crate::model::EntityKind;
use crate::repo::row::{parse_optional_uuid, parse_uuid};
use crate::repo::StoreError;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One restorable entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashItem {
    pub id: Uuid,
    pub kind: EntityKind,
    pub name: String,
    /// Parent container; `None` for root containers.
    pub parent_id: Option<Uuid>,
    pub updated_at: i64,
}

/// Lists trash entries of `world_id` ordered by `updated_at DESC, id ASC`.
pub fn list_trash(
    conn: &Connection,
    config: &EngineConfig,
    world_id: WorldId,
    skip: usize,
    take: usize,
) -> EngineResult<Vec<TrashItem>> {
    let take = config.trash_take(take);
    let mut stmt = conn.prepare(
        "SELECT id, kind, name, parent_id, updated_at FROM (
            SELECT id, 'container' AS kind, name, parent_id, updated_at
            FROM containers
            WHERE world_id = ?1 AND is_deleted = 1
            UNION ALL
            SELECT c.id, 'card' AS kind, c.name, c.parent_id, c.updated_at
            FROM cards c
            INNER JOIN containers k ON k.id = c.parent_id
            WHERE k.world_id = ?1 AND c.is_deleted = 1
         )
         ORDER BY updated_at DESC, id ASC
         LIMIT ?2 OFFSET ?3;",
    )?;
    let mut rows = stmt.query(params![world_id.to_string(), take as i64, skip as i64])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get(0)?;
        let kind_text: String = row.get(1)?;
        let kind = EntityKind::parse(&kind_text).ok_or_else(|| {
            StoreError::InvalidData(format!("invalid trash kind `{kind_text}`"))
        })?;
        items.push(TrashItem {
            id: parse_uuid(&id_text, "trash.id")?,
            kind,
            name: row.get(2)?,
            parent_id: parse_optional_uuid(row.get(3)?, "trash.parent_id")?,
            updated_at: row.get(4)?,
        });
    }
    Ok(items)
}
