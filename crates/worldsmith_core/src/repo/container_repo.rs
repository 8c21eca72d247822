//! Container persistence.
//!
//! # Invariants
//! - Child listing is deterministic: `sort_order ASC, id ASC`.
//! - Only alive rows are returned unless explicitly requested.

use super::row::{
    bool_to_int, now_ms, parse_bool, parse_optional_uuid, parse_uuid, soft_delete_row,
    stale_write_error,
};
use super::{ensure_schema_ready, Document, DocumentRepository, StoreError, StoreResult};
use crate::model::container::{Container, ContainerId, ContentType};
use crate::model::cursor::FeedCursor;
use crate::model::name::name_key;
use crate::model::world::WorldId;
use crate::model::EntityKind;
use rusqlite::{params, Connection, OptionalExtension, Row};

const CONTAINER_COLUMNS: &str = "id, world_id, parent_id, name, description, content_type, \
     sort_order, version, updated_at, is_deleted";

impl Document for Container {
    const KIND: EntityKind = EntityKind::Container;

    fn id(&self) -> ContainerId {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

/// SQLite-backed container store.
pub struct SqliteContainerRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContainerRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self::new(conn))
    }

    pub(crate) fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Lists children of `parent_id` (`None` = world roots).
    pub fn list_children(
        &self,
        world_id: WorldId,
        parent_id: Option<ContainerId>,
        include_deleted: bool,
        skip: usize,
        take: usize,
    ) -> StoreResult<Vec<Container>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONTAINER_COLUMNS}
             FROM containers
             WHERE world_id = ?1
               AND parent_id IS ?2
               AND (?3 = 1 OR is_deleted = 0)
             ORDER BY sort_order ASC, id ASC
             LIMIT ?4 OFFSET ?5;"
        ))?;
        let mut rows = stmt.query(params![
            world_id.to_string(),
            parent_id.map(|value| value.to_string()),
            bool_to_int(include_deleted),
            take as i64,
            skip as i64,
        ])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_container_row(row)?);
        }
        Ok(items)
    }

    /// Lists every alive container of a world, at any depth.
    pub fn list_by_world(
        &self,
        world_id: WorldId,
        skip: usize,
        take: usize,
    ) -> StoreResult<Vec<Container>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONTAINER_COLUMNS}
             FROM containers
             WHERE world_id = ?1
               AND is_deleted = 0
             ORDER BY sort_order ASC, id ASC
             LIMIT ?2 OFFSET ?3;"
        ))?;
        let mut rows = stmt.query(params![world_id.to_string(), take as i64, skip as i64])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_container_row(row)?);
        }
        Ok(items)
    }

    /// Next free sibling order among alive children.
    pub fn next_sort_order(
        &self,
        world_id: WorldId,
        parent_id: Option<ContainerId>,
    ) -> StoreResult<i64> {
        let next = self.conn.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1
             FROM containers
             WHERE world_id = ?1
               AND parent_id IS ?2
               AND is_deleted = 0;",
            params![world_id.to_string(), parent_id.map(|value| value.to_string())],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    /// Parent pointer of one container, regardless of deletion state.
    pub fn parent_of(&self, id: ContainerId) -> StoreResult<Option<Option<ContainerId>>> {
        let parent: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT parent_id FROM containers WHERE id = ?1;",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match parent {
            Some(value) => Ok(Some(parse_optional_uuid(value, "containers.parent_id")?)),
            None => Ok(None),
        }
    }

    /// Keyset page of containers changed after `cursor`, deleted rows included.
    pub fn list_updated_since(
        &self,
        cursor: &FeedCursor,
        limit: usize,
    ) -> StoreResult<Vec<Container>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONTAINER_COLUMNS}
             FROM containers
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
            items.push(parse_container_row(row)?);
        }
        Ok(items)
    }
}

impl DocumentRepository<Container> for SqliteContainerRepository<'_> {
    fn get(&self, id: ContainerId, include_deleted: bool) -> StoreResult<Option<Container>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONTAINER_COLUMNS}
             FROM containers
             WHERE id = ?1
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;
        let mut rows = stmt.query(params![id.to_string(), bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_container_row(row)?));
        }
        Ok(None)
    }

    fn upsert(&self, doc: &Container, expected_version: Option<i64>) -> StoreResult<Container> {
        let now = now_ms();
        let parent_id = doc.parent_id.map(|value| value.to_string());
        let key = name_key(&doc.name);
        let changed = self.conn.execute(
            "UPDATE containers
             SET world_id = ?2,
                 parent_id = ?3,
                 name = ?4,
                 name_key = ?5,
                 description = ?6,
                 content_type = ?7,
                 sort_order = ?8,
                 is_deleted = ?9,
                 version = version + 1,
                 updated_at = ?10
             WHERE id = ?1
               AND (?11 IS NULL OR version = ?11);",
            params![
                doc.id.to_string(),
                doc.world_id.to_string(),
                parent_id,
                doc.name,
                key,
                doc.description,
                doc.content_type.as_str(),
                doc.sort_order,
                bool_to_int(doc.is_deleted),
                now,
                expected_version,
            ],
        )?;

        if changed == 0 {
            if let Some(expected) = expected_version {
                return Err(stale_write_error(
                    self.conn,
                    "containers",
                    EntityKind::Container,
                    doc.id,
                    expected,
                ));
            }
            self.conn.execute(
                "INSERT INTO containers (
                    id,
                    world_id,
                    parent_id,
                    name,
                    name_key,
                    description,
                    content_type,
                    sort_order,
                    version,
                    updated_at,
                    is_deleted
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10);",
                params![
                    doc.id.to_string(),
                    doc.world_id.to_string(),
                    parent_id,
                    doc.name,
                    key,
                    doc.description,
                    doc.content_type.as_str(),
                    doc.sort_order,
                    now,
                    bool_to_int(doc.is_deleted),
                ],
            )?;
        }

        self.get(doc.id, true)?.ok_or(StoreError::NotFound {
            kind: EntityKind::Container,
            id: doc.id,
        })
    }

    fn delete(&self, id: ContainerId, expected_version: Option<i64>) -> StoreResult<bool> {
        soft_delete_row(
            self.conn,
            "containers",
            EntityKind::Container,
            id,
            expected_version,
        )
    }
}

fn parse_container_row(row: &Row<'_>) -> StoreResult<Container> {
    let id_text: String = row.get("id")?;
    let world_text: String = row.get("world_id")?;
    let content_type_text: String = row.get("content_type")?;
    let content_type = ContentType::parse(&content_type_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid content type `{content_type_text}` in containers.content_type"
        ))
    })?;

    Ok(Container {
        id: parse_uuid(&id_text, "containers.id")?,
        world_id: parse_uuid(&world_text, "containers.world_id")?,
        parent_id: parse_optional_uuid(row.get("parent_id")?, "containers.parent_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        content_type,
        sort_order: row.get("sort_order")?,
        version: row.get("version")?,
        updated_at: row.get("updated_at")?,
        is_deleted: parse_bool(row.get("is_deleted")?, "containers.is_deleted")?,
    })
}
