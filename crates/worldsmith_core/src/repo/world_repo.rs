//! World persistence.
//!
//! # Invariants
//! - `name_key` is always rewritten from `name` on upsert.
//! - Alive listing order: `updated_at DESC, id ASC`.

use super::row::{
    bool_to_int, escape_like, now_ms, parse_bool, parse_uuid, soft_delete_row, stale_write_error,
};
use super::{ensure_schema_ready, Document, DocumentRepository, StoreError, StoreResult};
use crate::model::cursor::FeedCursor;
use crate::model::name::name_key;
use crate::model::world::{World, WorldId};
use crate::model::EntityKind;
use rusqlite::{params, Connection, Row};

const WORLD_COLUMNS: &str = "id, name, description, version, updated_at, is_deleted";

impl Document for World {
    const KIND: EntityKind = EntityKind::World;

    fn id(&self) -> WorldId {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

/// SQLite-backed world store.
pub struct SqliteWorldRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteWorldRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self::new(conn))
    }

    pub(crate) fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Lists alive worlds, most recently touched first.
    pub fn list_alive(&self, skip: usize, take: usize) -> StoreResult<Vec<World>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WORLD_COLUMNS}
             FROM worlds
             WHERE is_deleted = 0
             ORDER BY updated_at DESC, id ASC
             LIMIT ?1 OFFSET ?2;"
        ))?;
        let mut rows = stmt.query(params![take as i64, skip as i64])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_world_row(row)?);
        }
        Ok(items)
    }

    /// Alive worlds whose name or description contains `text`, with `LIKE`
    /// wildcards in `text` matched literally.
    pub fn search(&self, text: &str, skip: usize, take: usize) -> StoreResult<Vec<World>> {
        let pattern = format!("%{}%", escape_like(text));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WORLD_COLUMNS}
             FROM worlds
             WHERE is_deleted = 0
               AND (name LIKE ?1 ESCAPE '\\' OR description LIKE ?1 ESCAPE '\\')
             ORDER BY updated_at DESC, id ASC
             LIMIT ?2 OFFSET ?3;"
        ))?;
        let mut rows = stmt.query(params![pattern, take as i64, skip as i64])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_world_row(row)?);
        }
        Ok(items)
    }

    /// Keyset page of worlds changed after `cursor`, deleted rows included.
    pub fn list_updated_since(&self, cursor: &FeedCursor, limit: usize) -> StoreResult<Vec<World>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WORLD_COLUMNS}
             FROM worlds
             WHERE updated_at > ?1
                OR (updated_at = ?1 AND id > ?2)
             ORDER BY updated_at ASC, id ASC
             LIMIT ?3;"
        ))?;
        let mut rows = stmt.query(params![
            cursor.updated_at,
            cursor.after_id_text(),
            limit as i64
        ])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_world_row(row)?);
        }
        Ok(items)
    }
}

impl DocumentRepository<World> for SqliteWorldRepository<'_> {
    fn get(&self, id: WorldId, include_deleted: bool) -> StoreResult<Option<World>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WORLD_COLUMNS}
             FROM worlds
             WHERE id = ?1
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;
        let mut rows = stmt.query(params![id.to_string(), bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_world_row(row)?));
        }
        Ok(None)
    }

    fn upsert(&self, doc: &World, expected_version: Option<i64>) -> StoreResult<World> {
        let now = now_ms();
        let changed = self.conn.execute(
            "UPDATE worlds
             SET name = ?2,
                 name_key = ?3,
                 description = ?4,
                 is_deleted = ?5,
                 version = version + 1,
                 updated_at = ?6
             WHERE id = ?1
               AND (?7 IS NULL OR version = ?7);",
            params![
                doc.id.to_string(),
                doc.name,
                name_key(&doc.name),
                doc.description,
                bool_to_int(doc.is_deleted),
                now,
                expected_version,
            ],
        )?;

        if changed == 0 {
            if let Some(expected) = expected_version {
                return Err(stale_write_error(
                    self.conn,
                    "worlds",
                    EntityKind::World,
                    doc.id,
                    expected,
                ));
            }
            self.conn.execute(
                "INSERT INTO worlds (id, name, name_key, description, version, updated_at, is_deleted)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6);",
                params![
                    doc.id.to_string(),
                    doc.name,
                    name_key(&doc.name),
                    doc.description,
                    now,
                    bool_to_int(doc.is_deleted),
                ],
            )?;
        }

        self.get(doc.id, true)?.ok_or(StoreError::NotFound {
            kind: EntityKind::World,
            id: doc.id,
        })
    }

    fn delete(&self, id: WorldId, expected_version: Option<i64>) -> StoreResult<bool> {
        soft_delete_row(self.conn, "worlds", EntityKind::World, id, expected_version)
    }
}

fn parse_world_row(row: &Row<'_>) -> StoreResult<World> {
    let id_text: String = row.get("id")?;
    Ok(World {
        id: parse_uuid(&id_text, "worlds.id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        version: row.get("version")?,
        updated_at: row.get("updated_at")?,
        is_deleted: parse_bool(row.get("is_deleted")?, "worlds.is_deleted")?,
    })
}
